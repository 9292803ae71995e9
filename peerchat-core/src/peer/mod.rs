//! Peer control surface
//!
//! [`ChatPeer`] wires one membership mirror, one distribution channel and
//! the per-user workers together. Every mutation updates the local store
//! first and then publishes the matching envelope; the workers of every
//! peer in the domain (this one included) pick it up from the channel.

use crate::channel::{DistributionChannel, Transport};
use crate::config::Config;
use crate::error::{ChatError, ChatResult};
use crate::membership::{Membership, MembershipSnapshot, MembershipStore};
use crate::model::{
    Announcement, ChatMessage, Envelope, Group, GroupId, MessageId, User, UserId, MAX_BODY_LEN,
};
use crate::pipeline::{
    run_worker, FilterPolicy, MirrorWorker, SharedInbox, UserWorker, WorkerTiming,
};
use crate::shutdown::{ShutdownCoordinator, ShutdownSignal, ShutdownState};
use hashlink::LinkedHashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

struct LocalUser {
    inbox: SharedInbox,
    worker: Option<JoinHandle<()>>,
}

/// One participant of a peerchat domain
pub struct ChatPeer {
    peer_id: Uuid,
    config: Config,
    channel: Arc<DistributionChannel>,
    store: Arc<MembershipStore>,
    local: Mutex<LinkedHashMap<UserId, LocalUser>>,
    mirror: Mutex<Option<JoinHandle<()>>>,
    shutdown: Arc<ShutdownCoordinator>,
    runtime: Handle,
}

impl ChatPeer {
    /// Validate `config`, open the channel and start the mirror worker
    ///
    /// Must be called from within a tokio runtime; workers are spawned on
    /// that runtime for the lifetime of the peer.
    pub fn start(config: Config, transport: Arc<dyn Transport>) -> ChatResult<Self> {
        config.validate()?;

        let peer_id = Uuid::new_v4();
        let runtime = Handle::current();
        let channel = Arc::new(DistributionChannel::new(
            config.bus.topic.clone(),
            config.qos,
            transport,
        ));
        let store = Arc::new(MembershipStore::new());
        let shutdown = Arc::new(ShutdownCoordinator::new());

        let mirror = MirrorWorker::new(&channel, Arc::clone(&store));
        let handle = runtime.spawn(run_worker(mirror, timing(&config), shutdown.subscribe()));

        info!(
            peer_id = %peer_id,
            topic = %config.bus.topic,
            poll_interval = ?config.bus.poll_interval,
            self_echo = %config.bus.self_echo,
            replay = %config.bus.replay,
            "Peer started"
        );

        Ok(Self {
            peer_id,
            config,
            channel,
            store,
            local: Mutex::new(LinkedHashMap::new()),
            mirror: Mutex::new(Some(handle)),
            shutdown,
            runtime,
        })
    }

    pub fn peer_id(&self) -> Uuid {
        self.peer_id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn channel(&self) -> &Arc<DistributionChannel> {
        &self.channel
    }

    /// Current view of the membership mirror
    pub fn snapshot(&self) -> Arc<MembershipSnapshot> {
        self.store.snapshot()
    }

    /// Create a user hosted by this peer and start its worker
    pub fn create_user(&self, display_name: &str) -> ChatResult<User> {
        self.ensure_running()?;
        let user = self.store.create_user(display_name)?;
        // Host the user before publishing so a rejected announcement still
        // leaves a readable inbox behind
        self.spawn_user_worker(user.id, &mut self.local_lock());
        self.publish(Announcement::User(user.clone()))?;
        info!(
            peer_id = %self.peer_id,
            user_id = %user.id,
            name = %user.display_name,
            "User created"
        );
        Ok(user)
    }

    /// Host an already announced user on this peer
    ///
    /// Lets the same identity read its inbox from several peers. Attaching
    /// a user that is already local is a no-op.
    pub fn attach_user(&self, user_id: &UserId) -> ChatResult<User> {
        self.ensure_running()?;
        let user = self.store.user(user_id)?;
        let mut local = self.local_lock();
        if local.contains_key(user_id) {
            return Ok(user);
        }
        self.spawn_user_worker(*user_id, &mut local);
        drop(local);
        info!(peer_id = %self.peer_id, user_id = %user_id, "User attached");
        Ok(user)
    }

    pub fn create_group(&self, name: &str) -> ChatResult<Group> {
        self.ensure_running()?;
        let group = self.store.create_group(name)?;
        self.publish(Announcement::Group(group.clone()))?;
        info!(peer_id = %self.peer_id, group_id = %group.id, name = %group.name, "Group created");
        Ok(group)
    }

    /// Add a user to a group and announce the resulting member set
    pub fn add_user_to_group(
        &self,
        user_id: &UserId,
        group_id: &GroupId,
    ) -> ChatResult<Membership> {
        self.ensure_running()?;
        let membership = self.store.add_user_to_group(user_id, group_id)?;
        // Re-announce even when nothing changed; announcements are idempotent
        self.publish(Announcement::Group(membership.group.clone()))?;
        info!(
            peer_id = %self.peer_id,
            user_id = %user_id,
            group_id = %group_id,
            changed = membership.changed,
            "Member added"
        );
        Ok(membership)
    }

    /// Publish a chat message from `user_id` to `group_id`
    ///
    /// The sender must be a member of the group in this peer's mirror.
    pub fn send_message(
        &self,
        group_id: &GroupId,
        user_id: &UserId,
        body: &str,
    ) -> ChatResult<MessageId> {
        self.ensure_running()?;
        if body.len() > MAX_BODY_LEN {
            return Err(ChatError::InvalidInput(format!(
                "message body exceeds {} bytes",
                MAX_BODY_LEN
            )));
        }

        let snapshot = self.store.snapshot();
        if snapshot.group(group_id).is_none() {
            return Err(ChatError::GroupNotFound(*group_id));
        }
        let sender = snapshot.user(user_id).ok_or(ChatError::UserNotFound(*user_id))?;
        if !sender.is_in(group_id) {
            return Err(ChatError::NotAMember {
                user: *user_id,
                group: *group_id,
            });
        }

        let msg = ChatMessage::new(*user_id, *group_id, body);
        let id = msg.id;
        self.channel.publish(&Envelope::ChatMessage(msg))?;
        debug!(
            peer_id = %self.peer_id,
            message_id = %id,
            user_id = %user_id,
            group_id = %group_id,
            "Message sent"
        );
        Ok(id)
    }

    pub fn list_users(&self) -> Vec<User> {
        self.store.list_users()
    }

    pub fn list_groups(&self) -> Vec<Group> {
        self.store.list_groups()
    }

    pub fn groups_of(&self, user_id: &UserId) -> ChatResult<Vec<Group>> {
        self.store.groups_of(user_id)
    }

    pub fn members_of(&self, group_id: &GroupId) -> ChatResult<Vec<User>> {
        self.store.members_of(group_id)
    }

    /// Messages delivered to a local user since the previous poll
    pub fn poll_inbox(&self, user_id: &UserId) -> ChatResult<Vec<ChatMessage>> {
        Ok(self.local_inbox(user_id)?.poll())
    }

    /// Every message delivered to a local user so far
    pub fn inbox(&self, user_id: &UserId) -> ChatResult<Vec<ChatMessage>> {
        Ok(self.local_inbox(user_id)?.all())
    }

    /// Users hosted by this peer, in creation order
    pub fn local_users(&self) -> Vec<UserId> {
        self.local_lock().keys().copied().collect()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_shutting_down()
    }

    pub fn shutdown_state(&self) -> ShutdownState {
        self.shutdown.state()
    }

    /// Signal every worker to stop and return immediately
    ///
    /// Workers exit at their next await point. A background task records
    /// completion once all of them are gone. Calling this twice is a no-op.
    pub fn shutdown(&self) {
        if !self.shutdown.shutdown(ShutdownSignal::Graceful) {
            return;
        }

        let mut handles: Vec<JoinHandle<()>> = self
            .local_lock()
            .iter_mut()
            .filter_map(|(_, local)| local.worker.take())
            .collect();
        if let Some(mirror) = self.mirror.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handles.push(mirror);
        }

        let coordinator = Arc::clone(&self.shutdown);
        let peer_id = self.peer_id;
        self.runtime.spawn(async move {
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(peer_id = %peer_id, error = %e, "Worker ended abnormally");
                }
            }
            coordinator.mark_complete();
        });
        info!(peer_id = %self.peer_id, "Peer shutting down");
    }

    fn ensure_running(&self) -> ChatResult<()> {
        if self.shutdown.is_shutting_down() {
            return Err(ChatError::ShutDown);
        }
        Ok(())
    }

    fn publish(&self, announcement: Announcement) -> ChatResult<()> {
        self.channel.publish(&announcement.into_envelope())
    }

    fn local_lock(&self) -> MutexGuard<'_, LinkedHashMap<UserId, LocalUser>> {
        self.local.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn local_inbox(&self, user_id: &UserId) -> ChatResult<SharedInbox> {
        if let Some(local) = self.local_lock().get(user_id) {
            return Ok(local.inbox.clone());
        }
        if self.store.contains_user(user_id) {
            Err(ChatError::NotLocal(*user_id))
        } else {
            Err(ChatError::UserNotFound(*user_id))
        }
    }

    fn spawn_user_worker(&self, user_id: UserId, local: &mut LinkedHashMap<UserId, LocalUser>) {
        let inbox = SharedInbox::new();
        let worker = UserWorker::new(
            user_id,
            &self.channel,
            Arc::clone(&self.store),
            inbox.clone(),
            FilterPolicy::new(self.config.bus.self_echo),
            self.config.bus.replay,
        );
        let handle = self
            .runtime
            .spawn(run_worker(worker, timing(&self.config), self.shutdown.subscribe()));
        local.insert(
            user_id,
            LocalUser {
                inbox,
                worker: Some(handle),
            },
        );
    }
}

impl Drop for ChatPeer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ChatPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatPeer")
            .field("peer_id", &self.peer_id)
            .field("topic", &self.channel.topic())
            .field("local_users", &self.local_lock().len())
            .field("state", &self.shutdown.state())
            .finish()
    }
}

fn timing(config: &Config) -> WorkerTiming {
    WorkerTiming::new(config.bus.poll_interval, config.bus.max_backoff)
}
