//! Session/Presence Hub.
//!
//! Single owner of all shared chat state. Each inbound event is validated
//! against the group registry (check-then-act: a rejected event leaves every
//! store untouched), applied to the relevant store, and fanned out to the
//! group's subscriber set. Group-scoped state (message log, pin board,
//! typing set) lives behind one mutex per group, so operations on the same
//! group serialize while unrelated groups proceed concurrently.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ed25519_dalek::VerifyingKey;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{info, warn};

use causerie_core::{GroupRegistry, IdentityStore, MessageLog, PinBoard};
use causerie_shared::auth::AccessToken;
use causerie_shared::constants::{DEFAULT_PIN_DURATION_DAYS, HISTORY_REPLAY_LIMIT};
use causerie_shared::error::{ChatError, Result};
use causerie_shared::protocol::{ClientEvent, ServerEvent};
use causerie_shared::types::{
    Actor, ConnectionId, Group, GroupId, GroupSettings, Message, MessageContent, MessageId,
    PinnedEntry, Role, UserId, UserProfile,
};

use crate::fanout::Fanout;

/// Everything that must mutate atomically for one group.
struct GroupRoom {
    log: MessageLog,
    pins: PinBoard,
    typing: HashSet<UserId>,
}

impl GroupRoom {
    fn new(group_id: GroupId, max_history: usize) -> Self {
        Self {
            log: MessageLog::with_max(group_id.clone(), max_history),
            pins: PinBoard::new(group_id),
            typing: HashSet::new(),
        }
    }
}

/// Live binding between one connection and one authenticated user.
struct Session {
    actor: Actor,
    subscribed: HashSet<GroupId>,
}

#[derive(Default)]
struct SessionTable {
    sessions: HashMap<ConnectionId, Session>,
    // user -> live session count; a user goes offline when it reaches zero
    online: HashMap<UserId, usize>,
    subscribers: HashMap<GroupId, HashSet<ConnectionId>>,
}

pub struct Hub {
    identity: RwLock<IdentityStore>,
    registry: RwLock<GroupRegistry>,
    rooms: RwLock<HashMap<GroupId, Arc<Mutex<GroupRoom>>>>,
    sessions: Mutex<SessionTable>,
    fanout: Fanout,
    verifying_key: VerifyingKey,
    max_history: usize,
}

impl Hub {
    pub fn new(verifying_key: VerifyingKey, max_history: usize) -> Self {
        Self {
            identity: RwLock::new(IdentityStore::new()),
            registry: RwLock::new(GroupRegistry::new()),
            rooms: RwLock::new(HashMap::new()),
            sessions: Mutex::new(SessionTable::default()),
            fanout: Fanout::new(),
            verifying_key,
            max_history,
        }
    }

    /// Seed the superAdmin account and the default group at startup.
    pub async fn bootstrap(
        &self,
        admin_id: UserId,
        display_name: String,
        password: String,
        default_group_name: &str,
    ) -> Result<()> {
        let profile = self.identity.write().await.bootstrap_user(
            admin_id,
            display_name,
            password,
            Role::SuperAdmin,
        )?;
        let root = Actor {
            id: profile.id,
            role: profile.role,
        };
        self.registry.write().await.bootstrap_default(
            GroupId("general".to_string()),
            default_group_name,
            &root,
        )?;
        Ok(())
    }

    // -------------------------------------------------------------------
    // Connection lifecycle
    // -------------------------------------------------------------------

    /// Register a new (unauthenticated) connection; returns the outbound
    /// event stream its transport task drains.
    pub async fn attach(&self) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let conn = ConnectionId::new();
        let rx = self.fanout.attach(conn).await;
        (conn, rx)
    }

    /// Entry point for every inbound event. Failures are recovered here and
    /// reported to the originating connection only.
    pub async fn handle_event(&self, conn: ConnectionId, event: ClientEvent) {
        if let Err(err) = self.dispatch(conn, event).await {
            warn!(conn = %conn, code = err.code(), error = %err, "Rejected client event");
            self.fanout
                .to_connection(conn, ServerEvent::error(&err))
                .await;
        }
    }

    /// Unicast an error report (used by the transport for frames that fail
    /// to parse before reaching the hub).
    pub async fn report_error(&self, conn: ConnectionId, err: &ChatError) {
        self.fanout
            .to_connection(conn, ServerEvent::error(err))
            .await;
    }

    async fn dispatch(&self, conn: ConnectionId, event: ClientEvent) -> Result<()> {
        match event {
            ClientEvent::Authenticate { token } => {
                self.authenticate(conn, &token).await.map(|_| ())
            }
            ClientEvent::JoinGroup { group_id } => self.join_group(conn, group_id).await,
            ClientEvent::LeaveGroup { group_id } => self.leave_group(conn, &group_id).await,
            ClientEvent::NewMessage {
                group_id,
                content,
                reply_to,
            } => self
                .send_message(conn, group_id, content, reply_to)
                .await
                .map(|_| ()),
            ClientEvent::ToggleReaction {
                group_id,
                message_id,
                emoji,
            } => self.react(conn, group_id, message_id, &emoji).await,
            ClientEvent::MarkSeen {
                group_id,
                message_id,
            } => self.mark_seen(conn, group_id, message_id).await,
            ClientEvent::Typing {
                group_id,
                is_typing,
            } => self.set_typing(conn, group_id, is_typing).await,
            ClientEvent::DeleteMessage {
                group_id,
                message_id,
            } => self.delete_message(conn, group_id, message_id).await,
            ClientEvent::PinMessage {
                group_id,
                message_id,
                duration_days,
            } => {
                self.pin_message(conn, group_id, message_id, duration_days)
                    .await
            }
        }
    }

    /// Authenticate a connection with a signed access token.
    ///
    /// On success the session is recorded, the connection is subscribed to
    /// every group the user belongs to, and the presence list is broadcast.
    pub async fn authenticate(&self, conn: ConnectionId, raw_token: &str) -> Result<Actor> {
        let claims = AccessToken::decode(raw_token)?.verify(&self.verifying_key)?;
        // Role truth comes from the store, so promotions take effect without
        // re-issuing tokens.
        let actor = self.refresh_actor(claims).await?;
        self.identity.write().await.touch_seen(&actor.id);

        let group_ids: Vec<GroupId> = {
            let registry = self.registry.read().await;
            registry
                .groups_for(&actor.id)
                .into_iter()
                .map(|g| g.id.clone())
                .collect()
        };

        {
            let mut table = self.sessions.lock().await;
            let table = &mut *table;
            if table.sessions.contains_key(&conn) {
                return Err(ChatError::Malformed("connection already authenticated".to_string()));
            }
            let mut subscribed = HashSet::new();
            for group_id in &group_ids {
                table
                    .subscribers
                    .entry(group_id.clone())
                    .or_default()
                    .insert(conn);
                subscribed.insert(group_id.clone());
            }
            table.sessions.insert(
                conn,
                Session {
                    actor: actor.clone(),
                    subscribed,
                },
            );
            *table.online.entry(actor.id.clone()).or_insert(0) += 1;
        }

        info!(conn = %conn, user = %actor.id, groups = group_ids.len(), "Connection authenticated");
        self.broadcast_presence().await;
        Ok(actor)
    }

    /// Tear down a connection. Idempotent: a second call for an already
    /// closed connection is a no-op.
    pub async fn disconnect(&self, conn: ConnectionId) {
        self.fanout.detach(conn).await;

        let removed = {
            let mut table = self.sessions.lock().await;
            let table = &mut *table;
            match table.sessions.remove(&conn) {
                None => None,
                Some(session) => {
                    for group_id in &session.subscribed {
                        let now_empty = table
                            .subscribers
                            .get_mut(group_id)
                            .map(|subs| {
                                subs.remove(&conn);
                                subs.is_empty()
                            })
                            .unwrap_or(false);
                        if now_empty {
                            table.subscribers.remove(group_id);
                        }
                    }
                    let last_session = match table.online.get_mut(&session.actor.id) {
                        Some(count) if *count > 1 => {
                            *count -= 1;
                            false
                        }
                        Some(_) => {
                            table.online.remove(&session.actor.id);
                            true
                        }
                        None => false,
                    };
                    Some((session, last_session))
                }
            }
        };

        let Some((session, last_session)) = removed else {
            return;
        };

        for group_id in &session.subscribed {
            if let Some(room) = self.existing_room(group_id).await {
                room.lock().await.typing.remove(&session.actor.id);
            }
        }
        self.identity.write().await.touch_seen(&session.actor.id);

        info!(conn = %conn, user = %session.actor.id, "Connection closed");
        if last_session {
            self.broadcast_presence().await;
        }
    }

    // -------------------------------------------------------------------
    // Group events
    // -------------------------------------------------------------------

    /// Subscribe to a group and replay its recent history + active pins to
    /// this connection only.
    pub async fn join_group(&self, conn: ConnectionId, group_id: GroupId) -> Result<()> {
        let actor = self.actor_for(conn).await?;
        if !self.registry.read().await.is_member(&group_id, &actor.id) {
            return Err(ChatError::NotAMember);
        }

        {
            let mut table = self.sessions.lock().await;
            let table = &mut *table;
            let session = table
                .sessions
                .get_mut(&conn)
                .ok_or(ChatError::AuthRequired)?;
            session.subscribed.insert(group_id.clone());
            table
                .subscribers
                .entry(group_id.clone())
                .or_default()
                .insert(conn);
        }

        let (messages, pinned_entries) = {
            let room = self.room(&group_id).await;
            let mut room = room.lock().await;
            (room.log.recent(HISTORY_REPLAY_LIMIT), room.pins.active_pins())
        };

        self.fanout
            .to_connection(
                conn,
                ServerEvent::GroupHistory {
                    group_id,
                    messages,
                    pinned_entries,
                },
            )
            .await;
        Ok(())
    }

    pub async fn leave_group(&self, conn: ConnectionId, group_id: &GroupId) -> Result<()> {
        let actor = self.actor_for(conn).await?;

        {
            let mut table = self.sessions.lock().await;
            let table = &mut *table;
            if let Some(session) = table.sessions.get_mut(&conn) {
                session.subscribed.remove(group_id);
            }
            let now_empty = table
                .subscribers
                .get_mut(group_id)
                .map(|subs| {
                    subs.remove(&conn);
                    subs.is_empty()
                })
                .unwrap_or(false);
            if now_empty {
                table.subscribers.remove(group_id);
            }
        }

        if let Some(room) = self.existing_room(group_id).await {
            room.lock().await.typing.remove(&actor.id);
        }
        Ok(())
    }

    /// Append a message and broadcast it to the group's subscribers.
    pub async fn send_message(
        &self,
        conn: ConnectionId,
        group_id: GroupId,
        content: MessageContent,
        reply_to: Option<MessageId>,
    ) -> Result<Message> {
        let actor = self.actor_for(conn).await?;
        let allow_media = {
            let registry = self.registry.read().await;
            if !registry.is_member(&group_id, &actor.id) {
                return Err(ChatError::NotAMember);
            }
            registry.get(&group_id)?.settings.allow_media
        };
        if content.is_media() && !allow_media {
            return Err(ChatError::PermissionDenied);
        }

        let message = {
            let room = self.room(&group_id).await;
            let mut room = room.lock().await;
            room.log.append(&actor.id, content, reply_to)?
        };

        self.to_group(&group_id, ServerEvent::MessageReceived(message.clone()))
            .await;
        Ok(message)
    }

    pub async fn react(
        &self,
        conn: ConnectionId,
        group_id: GroupId,
        message_id: MessageId,
        emoji: &str,
    ) -> Result<()> {
        let actor = self.actor_for(conn).await?;
        if !self.registry.read().await.is_member(&group_id, &actor.id) {
            return Err(ChatError::NotAMember);
        }

        let reactions = {
            let room = self.room(&group_id).await;
            let mut room = room.lock().await;
            room.log.toggle_reaction(message_id, &actor.id, emoji)?
        };

        self.to_group(
            &group_id,
            ServerEvent::ReactionUpdate {
                group_id: group_id.clone(),
                message_id,
                reactions,
            },
        )
        .await;
        Ok(())
    }

    /// Record a seen-mark; broadcasts only when the set actually changed.
    pub async fn mark_seen(
        &self,
        conn: ConnectionId,
        group_id: GroupId,
        message_id: MessageId,
    ) -> Result<()> {
        let actor = self.actor_for(conn).await?;
        if !self.registry.read().await.is_member(&group_id, &actor.id) {
            return Err(ChatError::NotAMember);
        }

        let changed = {
            let room = self.room(&group_id).await;
            let mut room = room.lock().await;
            room.log.mark_seen(message_id, &actor.id)?
        };

        if let Some(seen_by) = changed {
            self.to_group(
                &group_id,
                ServerEvent::SeenUpdate {
                    group_id: group_id.clone(),
                    message_id,
                    seen_by,
                },
            )
            .await;
        }
        Ok(())
    }

    /// Ephemeral typing indicator; never persisted, sender excluded from the
    /// broadcast.
    pub async fn set_typing(
        &self,
        conn: ConnectionId,
        group_id: GroupId,
        is_typing: bool,
    ) -> Result<()> {
        let actor = self.actor_for(conn).await?;
        if !self.registry.read().await.is_member(&group_id, &actor.id) {
            return Err(ChatError::NotAMember);
        }

        {
            let room = self.room(&group_id).await;
            let mut room = room.lock().await;
            if is_typing {
                room.typing.insert(actor.id.clone());
            } else {
                room.typing.remove(&actor.id);
            }
        }

        self.to_group_except(
            &group_id,
            conn,
            ServerEvent::UserTyping {
                group_id: group_id.clone(),
                user_id: actor.id,
                is_typing,
            },
        )
        .await;
        Ok(())
    }

    /// Hard-delete a message; cascades to any active pin for it.
    pub async fn delete_message(
        &self,
        conn: ConnectionId,
        group_id: GroupId,
        message_id: MessageId,
    ) -> Result<()> {
        let actor = self.actor_for(conn).await?;
        let (is_member, is_admin) = {
            let registry = self.registry.read().await;
            (
                registry.is_member(&group_id, &actor.id),
                registry.is_admin_of(&group_id, &actor),
            )
        };
        if !is_member && !is_admin {
            return Err(ChatError::NotAMember);
        }

        let pins_after_cascade = {
            let room = self.room(&group_id).await;
            let mut room = room.lock().await;
            room.log.delete(message_id, &actor.id, is_admin)?;
            if room.pins.unpin(message_id) {
                Some(room.pins.active_pins())
            } else {
                None
            }
        };

        self.to_group(
            &group_id,
            ServerEvent::MessageDeleted {
                group_id: group_id.clone(),
                message_id,
            },
        )
        .await;

        if let Some(pins) = pins_after_cascade {
            self.to_group(
                &group_id,
                ServerEvent::PinnedUpdate {
                    group_id: group_id.clone(),
                    pins,
                },
            )
            .await;
        }
        Ok(())
    }

    /// Pin an existing message for a number of days (admin only); replaces
    /// any prior active pin for the same message.
    pub async fn pin_message(
        &self,
        conn: ConnectionId,
        group_id: GroupId,
        message_id: MessageId,
        duration_days: Option<i64>,
    ) -> Result<()> {
        let actor = self.actor_for(conn).await?;
        if !self.registry.read().await.is_admin_of(&group_id, &actor) {
            return Err(ChatError::PermissionDenied);
        }

        let pins = {
            let room = self.room(&group_id).await;
            let mut room = room.lock().await;
            room.log.get(message_id)?;
            room.pins.pin(
                message_id,
                &actor.id,
                duration_days.unwrap_or(DEFAULT_PIN_DURATION_DAYS),
            )?;
            room.pins.active_pins()
        };

        self.to_group(
            &group_id,
            ServerEvent::PinnedUpdate {
                group_id: group_id.clone(),
                pins,
            },
        )
        .await;
        Ok(())
    }

    /// Periodic pin-expiry sweep; broadcasts the new active set for every
    /// group that changed.
    pub async fn sweep_pins(&self) {
        self.sweep_pins_at(Utc::now()).await;
    }

    pub async fn sweep_pins_at(&self, now: DateTime<Utc>) {
        let rooms: Vec<(GroupId, Arc<Mutex<GroupRoom>>)> = {
            let rooms = self.rooms.read().await;
            rooms
                .iter()
                .map(|(id, room)| (id.clone(), room.clone()))
                .collect()
        };

        for (group_id, room) in rooms {
            let changed = room.lock().await.pins.sweep_expired(now);
            if let Some(pins) = changed {
                self.to_group(
                    &group_id,
                    ServerEvent::PinnedUpdate {
                        group_id: group_id.clone(),
                        pins,
                    },
                )
                .await;
            }
        }
    }

    // -------------------------------------------------------------------
    // Request/response surface (REST wrappers)
    // -------------------------------------------------------------------

    /// Credential check for token issuance.
    pub async fn login(&self, user_id: &UserId, password: &str) -> Result<UserProfile> {
        let profile = self.identity.read().await.verify(user_id, password)?;
        self.identity.write().await.touch_seen(user_id);
        Ok(profile)
    }

    /// Re-resolve token claims against the identity store.
    pub async fn refresh_actor(&self, claims: Actor) -> Result<Actor> {
        let identity = self.identity.read().await;
        let profile = identity
            .lookup(&claims.id)
            .map_err(|_| ChatError::InvalidCredential)?;
        Ok(Actor {
            id: profile.id.clone(),
            role: profile.role,
        })
    }

    /// Create a user and enroll them into every default group.
    pub async fn create_user(
        &self,
        actor: &Actor,
        id: UserId,
        display_name: String,
        password: String,
        role: Role,
    ) -> Result<UserProfile> {
        let profile = self
            .identity
            .write()
            .await
            .create_user(id, display_name, password, role, actor)?;
        self.registry
            .write()
            .await
            .enroll_in_defaults(&profile.id);
        Ok(profile)
    }

    pub async fn create_group(
        &self,
        actor: &Actor,
        name: &str,
        description: &str,
        settings: GroupSettings,
    ) -> Result<Group> {
        self.registry
            .write()
            .await
            .create(name, description, actor, settings)
    }

    pub async fn add_member(
        &self,
        actor: &Actor,
        group_id: &GroupId,
        user_id: &UserId,
    ) -> Result<()> {
        self.identity.read().await.lookup(user_id)?;
        self.registry
            .write()
            .await
            .add_member(group_id, user_id, actor)
    }

    pub async fn promote_to_admin(
        &self,
        actor: &Actor,
        group_id: &GroupId,
        user_id: &UserId,
    ) -> Result<()> {
        self.registry
            .write()
            .await
            .promote_to_admin(group_id, user_id, actor)
    }

    pub async fn groups_for(&self, user_id: &UserId) -> Vec<Group> {
        self.registry
            .read()
            .await
            .groups_for(user_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn recent_messages(
        &self,
        actor: &Actor,
        group_id: &GroupId,
        limit: usize,
    ) -> Result<Vec<Message>> {
        if !self.registry.read().await.is_member(group_id, &actor.id) {
            return Err(ChatError::NotAMember);
        }
        let room = self.room(group_id).await;
        let room = room.lock().await;
        Ok(room.log.recent(limit))
    }

    pub async fn active_pins(&self, actor: &Actor, group_id: &GroupId) -> Result<Vec<PinnedEntry>> {
        if !self.registry.read().await.is_member(group_id, &actor.id) {
            return Err(ChatError::NotAMember);
        }
        let room = self.room(group_id).await;
        let mut room = room.lock().await;
        Ok(room.pins.active_pins())
    }

    // -------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------

    async fn actor_for(&self, conn: ConnectionId) -> Result<Actor> {
        self.sessions
            .lock()
            .await
            .sessions
            .get(&conn)
            .map(|s| s.actor.clone())
            .ok_or(ChatError::AuthRequired)
    }

    /// Get-or-create the state room for a group. Only reachable after a
    /// registry gate, so rooms exist only for real groups.
    async fn room(&self, group_id: &GroupId) -> Arc<Mutex<GroupRoom>> {
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(group_id) {
                return room.clone();
            }
        }
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(group_id.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(GroupRoom::new(group_id.clone(), self.max_history)))
            })
            .clone()
    }

    async fn existing_room(&self, group_id: &GroupId) -> Option<Arc<Mutex<GroupRoom>>> {
        self.rooms.read().await.get(group_id).cloned()
    }

    async fn to_group(&self, group_id: &GroupId, event: ServerEvent) {
        let targets: Vec<ConnectionId> = {
            let table = self.sessions.lock().await;
            table
                .subscribers
                .get(group_id)
                .map(|subs| subs.iter().copied().collect())
                .unwrap_or_default()
        };
        self.fanout.deliver(targets, event).await;
    }

    async fn to_group_except(&self, group_id: &GroupId, except: ConnectionId, event: ServerEvent) {
        let targets: Vec<ConnectionId> = {
            let table = self.sessions.lock().await;
            table
                .subscribers
                .get(group_id)
                .map(|subs| subs.iter().copied().filter(|c| *c != except).collect())
                .unwrap_or_default()
        };
        self.fanout.deliver(targets, event).await;
    }

    async fn broadcast_presence(&self) {
        let (targets, users) = {
            let table = self.sessions.lock().await;
            let targets: Vec<ConnectionId> = table.sessions.keys().copied().collect();
            let users: BTreeSet<UserId> = table.online.keys().cloned().collect();
            (targets, users)
        };
        self.fanout
            .deliver(targets, ServerEvent::OnlineUsers(users))
            .await;
    }
}
