//! The F-Chat session engine.
//!
//! [`FChatSession::connect`] authenticates, opens a transport, identifies,
//! and spawns the background session loop. The loop is the only owner of the
//! transport: it receives inbound frames, runs them through the
//! [`Dispatcher`], and writes outbound frames handed to it by the paced drain
//! task. A watchdog task forces the session closed when keepalives stop.
//!
//! # Example
//!
//! ```rust,ignore
//! let tickets = TicketManager::new(Arc::new(HttpAccountService::new()?), "account", "password");
//! let config = SessionConfig::new("account", "My Character");
//! let (session, mut events) = FChatSession::connect(&WebSocketConnector::new(), &tickets, config).await?;
//!
//! session.join_channel("Frontpage")?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ChatEvent::PrivateMessage { character, message } => {
//!             session.send_private_message(&character, &message)?;
//!         }
//!         ChatEvent::Disconnected { reason } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, Notify, RwLock, RwLockReadGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::config::SessionConfig;
use crate::dispatch::{Dispatcher, Effect};
use crate::error::{FChatError, Result};
use crate::event::{ChatEvent, DisconnectReason};
use crate::protocol::{
    unescape_entities, ChannelMode, ClientCommand, Frame, IgnoreAction, RoomStatus, SearchFilters,
    Status, TypingStatus,
};
use crate::queue::{OutgoingQueue, Pending};
use crate::ticket::TicketManager;
use crate::transport::{Connector, Transport};
use crate::watchdog::{HealthWatchdog, KeepaliveClock, WatchdogExit};
use crate::world::WorldState;

/// Capacity of the drain → session loop channel.
const OUTBOUND_CHANNEL_CAPACITY: usize = 16;

/// Identification method sent in IDN.
const IDENTIFY_METHOD: &str = "ticket";

// ── Lifecycle state ─────────────────────────────────────────────────

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Idle = 0,
    Authenticating = 1,
    Connecting = 2,
    Identifying = 3,
    Active = 4,
    Closing = 5,
    Closed = 6,
    /// Setup failed; the session never became active.
    Faulted = 7,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Authenticating,
            2 => Self::Connecting,
            3 => Self::Identifying,
            4 => Self::Active,
            5 => Self::Closing,
            6 => Self::Closed,
            _ => Self::Faulted,
        }
    }
}

/// Atomic cell for [`SessionState`] with compare-and-swap transitions.
#[derive(Debug)]
struct AtomicState(AtomicU8);

impl AtomicState {
    fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn load(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn store(&self, state: SessionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move `from → to`; false if the current state was not `from`.
    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// State shared between the handle and the background tasks.
struct Shared {
    config: SessionConfig,
    state: AtomicState,
    running: Arc<AtomicBool>,
    world: RwLock<WorldState>,
    queue: Arc<OutgoingQueue>,
    clock: Arc<KeepaliveClock>,
    close_signal: Notify,
    close_reason: Mutex<Option<DisconnectReason>>,
    terminal: watch::Sender<Option<DisconnectReason>>,
}

impl Shared {
    fn new(config: SessionConfig) -> Self {
        let queue = Arc::new(OutgoingQueue::new(config.outgoing_delay));
        let (terminal, _) = watch::channel(None);
        Self {
            config,
            state: AtomicState::new(SessionState::Idle),
            running: Arc::new(AtomicBool::new(false)),
            world: RwLock::new(WorldState::new()),
            queue,
            clock: Arc::new(KeepaliveClock::new()),
            close_signal: Notify::new(),
            close_reason: Mutex::new(None),
            terminal,
        }
    }

    /// Start closing with `reason`. Only the first caller wins.
    fn begin_close(&self, reason: DisconnectReason) -> bool {
        let won = [SessionState::Active, SessionState::Identifying]
            .into_iter()
            .any(|from| self.state.transition(from, SessionState::Closing));
        if won {
            debug!(%reason, "closing session");
            *self
                .close_reason
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(reason);
            self.close_signal.notify_one();
        }
        won
    }

    fn take_close_reason(&self) -> Option<DisconnectReason> {
        self.close_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Publish the terminal reason once.
    fn finish(&self, reason: DisconnectReason) {
        self.terminal.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(reason);
            true
        });
    }

    fn log_inbound(&self, code: &str, raw: &str) {
        if self.config.is_filtered(code) {
            return;
        }
        if code == "PIN" && !self.config.log_pings {
            trace!("<< {raw}");
        } else {
            debug!("<< {raw}");
        }
    }

    fn log_outbound(&self, command: &ClientCommand, frame: &str) {
        match command {
            ClientCommand::Identify { character, .. } => debug!(%character, ">> IDN"),
            _ if command.is_keepalive() && !self.config.log_pings => trace!(">> {frame}"),
            _ => debug!(">> {frame}"),
        }
    }
}

// ── Session handle ──────────────────────────────────────────────────

/// Handle to one logged-in character's connection.
///
/// Command methods validate their arguments and append to the paced
/// outgoing queue; they return as soon as the command is queued.
pub struct FChatSession {
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
}

impl FChatSession {
    /// Authenticate, connect, and identify.
    ///
    /// Returns once the server has confirmed identification and the settle
    /// delay has passed. The receiver yields [`ChatEvent`]s until the final
    /// [`ChatEvent::Disconnected`].
    ///
    /// # Errors
    ///
    /// - [`FChatError::Auth`] if no ticket could be obtained.
    /// - [`FChatError::Connect`] or [`FChatError::Timeout`] if the transport
    ///   cannot be opened.
    /// - [`FChatError::TransportClosed`] if the server hangs up before
    ///   confirming identification.
    /// - [`FChatError::Timeout`] if confirmation does not arrive within
    ///   [`SessionConfig::identify_timeout`].
    pub async fn connect<C>(
        connector: &C,
        tickets: &TicketManager,
        config: SessionConfig,
    ) -> Result<(Self, mpsc::Receiver<ChatEvent>)>
    where
        C: Connector + ?Sized,
    {
        let shared = Arc::new(Shared::new(config));
        let config = &shared.config;

        shared.state.store(SessionState::Authenticating);
        let ticket = match tickets.get_ticket().await {
            Ok(ticket) => ticket,
            Err(e) => {
                shared.state.store(SessionState::Faulted);
                return Err(e);
            }
        };

        shared.state.store(SessionState::Connecting);
        info!(url = %config.url, character = %config.character, "connecting");
        let mut transport = match connector.open(&config.url).await {
            Ok(transport) => transport,
            Err(e) => {
                error!("failed to open transport: {e}");
                shared.state.store(SessionState::Faulted);
                return Err(e);
            }
        };

        shared.state.store(SessionState::Identifying);
        let identify = ClientCommand::Identify {
            method: IDENTIFY_METHOD,
            account: config.account.clone(),
            ticket,
            character: config.character.clone(),
            cname: config.client_name.clone(),
            cversion: config.client_version.clone(),
        };
        let sent = match identify.to_frame() {
            Ok(frame) => {
                shared.log_outbound(&identify, &frame);
                transport.send(frame).await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            error!("failed to send identification: {e}");
            let _ = transport.close().await;
            shared.state.store(SessionState::Faulted);
            return Err(e);
        }

        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let (identified_tx, identified_rx) = oneshot::channel();
        emit_event(&event_tx, ChatEvent::Connected);

        let mut task = tokio::spawn(session_loop(
            transport,
            Arc::clone(&shared),
            event_tx,
            identified_tx,
        ));

        let outcome = tokio::time::timeout(config.identify_timeout, identified_rx).await;
        let failure = match outcome {
            Ok(Ok(Ok(()))) => None,
            Ok(Ok(Err(e))) => Some(e),
            Ok(Err(_)) => Some(FChatError::TransportClosed),
            Err(_) => {
                warn!(timeout = ?config.identify_timeout, "no identification from server");
                shared.begin_close(DisconnectReason::ClientClosed);
                Some(FChatError::Timeout)
            }
        };
        if let Some(e) = failure {
            join_or_abort(&mut task, config.shutdown_timeout).await;
            shared.running.store(false, Ordering::Release);
            shared.state.store(SessionState::Faulted);
            return Err(e);
        }

        if !config.settle_delay.is_zero() {
            tokio::time::sleep(config.settle_delay).await;
        }
        info!(character = %config.character, "session active");

        let session = Self {
            shared,
            task: Some(task),
        };
        Ok((session, event_rx))
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.state.load()
    }

    /// Whether commands are currently accepted.
    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// The logged-in character.
    pub fn character(&self) -> &str {
        &self.shared.config.character
    }

    /// The configuration this session was started with.
    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Read access to the mirrored world state.
    pub async fn world(&self) -> RwLockReadGuard<'_, WorldState> {
        self.shared.world.read().await
    }

    /// Current outbound pacing delay.
    pub fn outgoing_delay(&self) -> Duration {
        self.shared.queue.delay()
    }

    /// Commands waiting in the outgoing queue.
    pub fn queued(&self) -> usize {
        self.shared.queue.len()
    }

    /// The terminal reason, if the session has ended.
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        self.shared.terminal.borrow().clone()
    }

    /// Wait until the session has ended and return why.
    pub async fn closed(&self) -> DisconnectReason {
        let mut rx = self.shared.terminal.subscribe();
        let reason = match rx.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone().unwrap_or(DisconnectReason::ClientClosed),
            Err(_) => DisconnectReason::ClientClosed,
        };
        reason
    }

    /// Close the session.
    ///
    /// Idempotent. Waits at most [`SessionConfig::shutdown_timeout`] for the
    /// session loop to close the transport, then aborts it.
    pub async fn close(&mut self) {
        if !self.shared.begin_close(DisconnectReason::ClientClosed) {
            debug!("close requested while already closing");
        }
        if let Some(mut task) = self.task.take() {
            join_or_abort(&mut task, self.shared.config.shutdown_timeout).await;
        }
        self.shared.running.store(false, Ordering::Release);
        self.shared.state.store(SessionState::Closed);
        self.shared.finish(DisconnectReason::ClientClosed);
    }

    // ── Status ──────────────────────────────────────────────────────

    /// Set own status and status message (STA).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for statuses a user cannot choose,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn set_status(&self, status: Status, message: &str) -> Result<()> {
        if matches!(status, Status::Crown | Status::Unknown) {
            return Err(FChatError::InvalidArgument("status"));
        }
        self.send_command(ClientCommand::SetStatus {
            status,
            statusmsg: message.to_string(),
        })
    }

    // ── Channels ────────────────────────────────────────────────────

    /// Join a channel by id (JCH).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for an empty channel,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn join_channel(&self, channel: &str) -> Result<()> {
        require(channel, "channel")?;
        self.send_command(ClientCommand::JoinChannel {
            channel: channel.to_string(),
        })
    }

    /// Leave a channel (LCH).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for an empty channel,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn leave_channel(&self, channel: &str) -> Result<()> {
        require(channel, "channel")?;
        self.send_command(ClientCommand::LeaveChannel {
            channel: channel.to_string(),
        })
    }

    /// Create a private, invite-only channel (CCR).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for an empty name,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn create_private_channel(&self, name: &str) -> Result<()> {
        require(name, "channel")?;
        self.send_command(ClientCommand::CreatePrivateChannel {
            channel: name.to_string(),
        })
    }

    // ── Channel moderation ──────────────────────────────────────────

    /// Kick a character from a channel (CKU).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for empty arguments,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn kick(&self, channel: &str, character: &str) -> Result<()> {
        let (channel, character) = channel_target(channel, character)?;
        self.send_command(ClientCommand::ChannelKick { channel, character })
    }

    /// Ban a character from a channel (CBU).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for empty arguments,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn ban(&self, channel: &str, character: &str) -> Result<()> {
        let (channel, character) = channel_target(channel, character)?;
        self.send_command(ClientCommand::ChannelBan { channel, character })
    }

    /// Lift a channel ban (CUB).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for empty arguments,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn unban(&self, channel: &str, character: &str) -> Result<()> {
        let (channel, character) = channel_target(channel, character)?;
        self.send_command(ClientCommand::ChannelUnban { channel, character })
    }

    /// Time a character out of a channel for `minutes` (CTU).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for empty arguments or zero minutes,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn timeout(&self, channel: &str, character: &str, minutes: u32) -> Result<()> {
        let (channel, character) = channel_target(channel, character)?;
        if minutes == 0 {
            return Err(FChatError::InvalidArgument("length"));
        }
        self.send_command(ClientCommand::ChannelTimeout {
            channel,
            character,
            length: minutes,
        })
    }

    /// Promote a channel operator (COA).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for empty arguments,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn promote_channel_op(&self, channel: &str, character: &str) -> Result<()> {
        let (channel, character) = channel_target(channel, character)?;
        self.send_command(ClientCommand::PromoteChannelOp { channel, character })
    }

    /// Demote a channel operator (COR).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for empty arguments,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn demote_channel_op(&self, channel: &str, character: &str) -> Result<()> {
        let (channel, character) = channel_target(channel, character)?;
        self.send_command(ClientCommand::DemoteChannelOp { channel, character })
    }

    /// Hand channel ownership to `character` (CSO).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for empty arguments,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn set_channel_owner(&self, channel: &str, character: &str) -> Result<()> {
        let (channel, character) = channel_target(channel, character)?;
        self.send_command(ClientCommand::SetChannelOwner { character, channel })
    }

    /// Replace a channel's description (CDS).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for an empty channel,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn set_channel_description(&self, channel: &str, description: &str) -> Result<()> {
        require(channel, "channel")?;
        self.send_command(ClientCommand::SetChannelDescription {
            channel: channel.to_string(),
            description: description.to_string(),
        })
    }

    /// Restrict which message kinds a channel accepts (RMO).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for an empty channel,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn set_channel_mode(&self, channel: &str, mode: ChannelMode) -> Result<()> {
        require(channel, "channel")?;
        self.send_command(ClientCommand::SetChannelMode {
            channel: channel.to_string(),
            mode,
        })
    }

    /// Open or close a private room (RST).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for an empty channel,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn set_room_status(&self, channel: &str, status: RoomStatus) -> Result<()> {
        require(channel, "channel")?;
        self.send_command(ClientCommand::SetRoomStatus {
            channel: channel.to_string(),
            status,
        })
    }

    /// Invite a character to a channel (CIU).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for empty arguments,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn invite(&self, channel: &str, character: &str) -> Result<()> {
        let (channel, character) = channel_target(channel, character)?;
        self.send_command(ClientCommand::Invite { channel, character })
    }

    /// Request a channel's operator list (COL).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for an empty channel,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn request_channel_ops(&self, channel: &str) -> Result<()> {
        require(channel, "channel")?;
        self.send_command(ClientCommand::ChannelOpList {
            channel: channel.to_string(),
        })
    }

    /// Request a channel's ban list (CBL).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for an empty channel,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn request_ban_list(&self, channel: &str) -> Result<()> {
        require(channel, "channel")?;
        self.send_command(ClientCommand::ChannelBanList {
            channel: channel.to_string(),
        })
    }

    // ── Messages ────────────────────────────────────────────────────

    /// Send a private message (PRI).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for empty arguments,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn send_private_message(&self, recipient: &str, message: &str) -> Result<()> {
        require(recipient, "recipient")?;
        require(message, "message")?;
        self.send_command(ClientCommand::PrivateMessage {
            recipient: recipient.to_string(),
            message: unescape_entities(message, false),
        })
    }

    /// Send a message to a channel (MSG).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for empty arguments,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn send_channel_message(&self, channel: &str, message: &str) -> Result<()> {
        require(channel, "channel")?;
        require(message, "message")?;
        self.send_command(ClientCommand::ChannelMessage {
            channel: channel.to_string(),
            message: unescape_entities(message, true),
        })
    }

    /// Post an ad to a channel (LRP).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for empty arguments,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn send_channel_ad(&self, channel: &str, message: &str) -> Result<()> {
        require(channel, "channel")?;
        require(message, "message")?;
        self.send_command(ClientCommand::ChannelAd {
            channel: channel.to_string(),
            message: message.to_string(),
        })
    }

    /// Roll dice in a channel, e.g. `"1d20+2"` (RLL).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for empty arguments,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn roll_dice(&self, channel: &str, dice: &str) -> Result<()> {
        require(channel, "channel")?;
        require(dice, "dice")?;
        self.send_command(ClientCommand::Roll {
            channel: channel.to_string(),
            dice: dice.to_string(),
        })
    }

    /// Spin the bottle in a channel (RLL).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for an empty channel,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn spin_bottle(&self, channel: &str) -> Result<()> {
        self.roll_dice(channel, "bottle")
    }

    /// Tell a private-message partner our typing status (TPN).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for an empty character,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn send_typing(&self, character: &str, status: TypingStatus) -> Result<()> {
        require(character, "character")?;
        self.send_command(ClientCommand::Typing {
            character: character.to_string(),
            status,
        })
    }

    // ── Ignore list ─────────────────────────────────────────────────

    /// Add a character to the ignore list (IGN add).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for an empty character,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn ignore(&self, character: &str) -> Result<()> {
        self.ignore_action(IgnoreAction::Add, character)
    }

    /// Remove a character from the ignore list (IGN delete).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for an empty character,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn unignore(&self, character: &str) -> Result<()> {
        self.ignore_action(IgnoreAction::Delete, character)
    }

    /// Tell the server a private message from `character` was ignored
    /// (IGN notify).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for an empty character,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn notify_ignored(&self, character: &str) -> Result<()> {
        self.ignore_action(IgnoreAction::Notify, character)
    }

    /// Request the full ignore list (IGN list).
    ///
    /// # Errors
    ///
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn request_ignore_list(&self) -> Result<()> {
        self.send_command(ClientCommand::Ignore {
            action: IgnoreAction::List,
            character: None,
        })
    }

    fn ignore_action(&self, action: IgnoreAction, character: &str) -> Result<()> {
        require(character, "character")?;
        self.send_command(ClientCommand::Ignore {
            action,
            character: Some(character.to_string()),
        })
    }

    // ── Server queries ──────────────────────────────────────────────

    /// Request server uptime statistics (UPT).
    ///
    /// # Errors
    ///
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn request_uptime(&self) -> Result<()> {
        self.send_command(ClientCommand::Uptime)
    }

    /// Request the public channel list (CHA).
    ///
    /// # Errors
    ///
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn request_public_channels(&self) -> Result<()> {
        self.send_command(ClientCommand::PublicChannels)
    }

    /// Request the open private room list (ORS).
    ///
    /// # Errors
    ///
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn request_private_rooms(&self) -> Result<()> {
        self.send_command(ClientCommand::PrivateRooms)
    }

    /// Request a character's profile tags (PRO).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for an empty character,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn request_profile_tags(&self, character: &str) -> Result<()> {
        require(character, "character")?;
        self.send_command(ClientCommand::ProfileTags {
            character: character.to_string(),
        })
    }

    /// Request a character's kink list (KIN).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for an empty character,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn request_kinks(&self, character: &str) -> Result<()> {
        require(character, "character")?;
        self.send_command(ClientCommand::Kinks {
            character: character.to_string(),
        })
    }

    /// Search for characters by kink ids and optional filters (FKS).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] without kinks,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn search(&self, kinks: Vec<String>, filters: SearchFilters) -> Result<()> {
        if kinks.is_empty() {
            return Err(FChatError::InvalidArgument("kinks"));
        }
        self.send_command(ClientCommand::search(kinks, filters))
    }

    /// Alert moderators about `character` (SFC).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for empty arguments,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn report(&self, character: &str, report: &str) -> Result<()> {
        require(character, "character")?;
        require(report, "report")?;
        self.send_command(ClientCommand::Report {
            action: "report",
            report: report.to_string(),
            character: character.to_string(),
        })
    }

    // ── Chat operator / admin ───────────────────────────────────────

    /// Ban an account from chat (ACB).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for an empty character,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn account_ban(&self, character: &str) -> Result<()> {
        self.character_command(character, |character| ClientCommand::AccountBan { character })
    }

    /// Promote a global chat operator (AOP).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for an empty character,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn promote_chat_op(&self, character: &str) -> Result<()> {
        self.character_command(character, |character| ClientCommand::PromoteChatOp {
            character,
        })
    }

    /// List alternate characters of `character` (AWC).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for an empty character,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn list_alts(&self, character: &str) -> Result<()> {
        self.character_command(character, |character| ClientCommand::Alts { character })
    }

    /// Broadcast to everyone on the server (BRO).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for an empty message,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn broadcast(&self, message: &str) -> Result<()> {
        require(message, "message")?;
        self.send_command(ClientCommand::Broadcast {
            message: message.to_string(),
        })
    }

    /// Create an official channel (CRC).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for an empty channel,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn create_official_channel(&self, channel: &str) -> Result<()> {
        require(channel, "channel")?;
        self.send_command(ClientCommand::CreateOfficialChannel {
            channel: channel.to_string(),
        })
    }

    /// Demote a global chat operator (DOP).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for an empty character,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn demote_chat_op(&self, character: &str) -> Result<()> {
        self.character_command(character, |character| ClientCommand::DemoteChatOp { character })
    }

    /// Delete a channel (KIC).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for an empty channel,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn delete_channel(&self, channel: &str) -> Result<()> {
        require(channel, "channel")?;
        self.send_command(ClientCommand::DeleteChannel {
            channel: channel.to_string(),
        })
    }

    /// Kick a character off the server (KIK).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for an empty character,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn server_kick(&self, character: &str) -> Result<()> {
        self.character_command(character, |character| ClientCommand::ServerKick { character })
    }

    /// Give a character the crown status (RWD).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for an empty character,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn reward(&self, character: &str) -> Result<()> {
        self.character_command(character, |character| ClientCommand::Reward { character })
    }

    /// Time a character out of the server (TMO).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for empty arguments or zero minutes,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn server_timeout(&self, character: &str, minutes: u32, reason: &str) -> Result<()> {
        require(character, "character")?;
        require(reason, "reason")?;
        if minutes == 0 {
            return Err(FChatError::InvalidArgument("time"));
        }
        self.send_command(ClientCommand::ServerTimeout {
            character: character.to_string(),
            time: minutes,
            reason: reason.to_string(),
        })
    }

    /// Lift a server ban (UNB).
    ///
    /// # Errors
    ///
    /// [`FChatError::InvalidArgument`] for an empty character,
    /// [`FChatError::NotConnected`] when the session is not active.
    pub fn unban_account(&self, character: &str) -> Result<()> {
        self.character_command(character, |character| ClientCommand::Unban { character })
    }

    // ── Internal helpers ────────────────────────────────────────────

    /// Queue any command. Prefer the typed methods, which validate arguments.
    ///
    /// # Errors
    ///
    /// [`FChatError::StaleConnection`] when the watchdog ended the session,
    /// otherwise [`FChatError::NotConnected`] when it is not active.
    pub fn send_command(&self, command: ClientCommand) -> Result<()> {
        if !self.is_active() {
            return Err(match self.disconnect_reason() {
                Some(DisconnectReason::Stale) => FChatError::StaleConnection,
                _ => FChatError::NotConnected,
            });
        }
        self.shared.queue.enqueue(command);
        Ok(())
    }

    fn character_command<F>(&self, character: &str, build: F) -> Result<()>
    where
        F: FnOnce(String) -> ClientCommand,
    {
        require(character, "character")?;
        self.send_command(build(character.to_string()))
    }
}

impl std::fmt::Debug for FChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FChatSession")
            .field("character", &self.shared.config.character)
            .field("state", &self.state())
            .field("queued", &self.queued())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for FChatSession {
    fn drop(&mut self) {
        // No executor to drive a graceful close here. Stopping the flag ends
        // the drain and watchdog loops; aborting drops the transport.
        self.shared.running.store(false, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn require(value: &str, name: &'static str) -> Result<()> {
    if value.trim().is_empty() {
        Err(FChatError::InvalidArgument(name))
    } else {
        Ok(())
    }
}

fn channel_target(channel: &str, character: &str) -> Result<(String, String)> {
    require(channel, "channel")?;
    require(character, "character")?;
    Ok((channel.to_string(), character.to_string()))
}

async fn join_or_abort(task: &mut JoinHandle<()>, timeout: Duration) {
    match tokio::time::timeout(timeout, &mut *task).await {
        Ok(Ok(())) => {}
        Ok(Err(join_err)) => warn!("session loop terminated with join error: {join_err}"),
        Err(_) => {
            warn!("session loop did not exit within timeout; aborting task");
            task.abort();
            if let Err(join_err) = task.await {
                debug!("session loop aborted: {join_err}");
            }
        }
    }
}

// ── Session loop ────────────────────────────────────────────────────

/// Background tasks started once the server confirms identification.
struct ActiveTasks {
    drain: JoinHandle<()>,
    watchdog: JoinHandle<()>,
}

impl ActiveTasks {
    fn start(shared: &Arc<Shared>, outbound: mpsc::Sender<Pending>) -> Self {
        shared.running.store(true, Ordering::Release);
        shared.clock.touch();

        let drain = tokio::spawn(Arc::clone(&shared.queue).drain_loop(
            outbound,
            Arc::clone(&shared.running),
            shared.config.idle_poll,
        ));

        let watchdog = HealthWatchdog::new(
            Arc::clone(&shared.clock),
            shared.config.stale_after,
            shared.config.watchdog_interval,
        );
        let running = Arc::clone(&shared.running);
        let watch_shared = Arc::clone(shared);
        let watchdog = tokio::spawn(async move {
            if watchdog.run(running).await == WatchdogExit::Stale {
                watch_shared.begin_close(DisconnectReason::Stale);
            }
        });

        Self { drain, watchdog }
    }

    /// Stop both loops. They also watch the running flag, but aborting keeps
    /// teardown from waiting out a pacing sleep.
    async fn stop(self, running: &AtomicBool) {
        running.store(false, Ordering::Release);
        for task in [self.drain, self.watchdog] {
            task.abort();
            if let Err(join_err) = task.await {
                if !join_err.is_cancelled() {
                    warn!("background task failed: {join_err}");
                }
            }
        }
    }
}

/// Owns the transport for the whole connection.
///
/// Exits when:
/// - a close is requested (caller or watchdog)
/// - the transport returns `None` (server closed the connection)
/// - a transport error occurs
async fn session_loop<T: Transport>(
    mut transport: T,
    shared: Arc<Shared>,
    event_tx: mpsc::Sender<ChatEvent>,
    identified_tx: oneshot::Sender<Result<()>>,
) {
    debug!("session loop started");

    let dispatcher = Dispatcher::new(shared.config.character.clone());
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Pending>(OUTBOUND_CHANNEL_CAPACITY);
    let mut outbound_tx = Some(outbound_tx);
    let mut identified_tx = Some(identified_tx);
    let mut active: Option<ActiveTasks> = None;

    let reason = loop {
        tokio::select! {
            // Branch 1: close requested
            () = shared.close_signal.notified() => {
                break shared.take_close_reason().unwrap_or(DisconnectReason::ClientClosed);
            }

            // Branch 2: paced outbound command from the drain task
            Some(pending) = outbound_rx.recv() => {
                let frame = match pending.command.to_frame() {
                    Ok(frame) => frame,
                    Err(e) => {
                        error!(code = pending.command.code(), "failed to encode command: {e}");
                        pending.ack();
                        continue;
                    }
                };
                shared.log_outbound(&pending.command, &frame);
                if let Err(e) = transport.send(frame).await {
                    error!("transport send error: {e}");
                    break DisconnectReason::Transport(e.to_string());
                }
                pending.ack();
            }

            // Branch 3: inbound frame from the server
            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(raw)) => {
                        let frame = Frame::parse(&raw);
                        shared.log_inbound(&frame.code, &raw);

                        let dispatch = {
                            let mut world = shared.world.write().await;
                            dispatcher.handle(&mut world, &frame)
                        };

                        for effect in dispatch.effects {
                            match effect {
                                Effect::ReplyKeepalive => shared.queue.enqueue(ClientCommand::Ping),
                                Effect::KeepaliveSeen => shared.clock.touch(),
                                Effect::SetOutgoingDelay(delay) => shared.queue.set_delay(delay),
                                Effect::Identified => {
                                    if shared.state.transition(SessionState::Identifying, SessionState::Active) {
                                        if let Some(tx) = outbound_tx.take() {
                                            active = Some(ActiveTasks::start(&shared, tx));
                                        }
                                        if let Some(tx) = identified_tx.take() {
                                            let _ = tx.send(Ok(()));
                                        }
                                    }
                                }
                            }
                        }

                        if let Some(event) = dispatch.event {
                            emit_event(&event_tx, event);
                        }
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        break DisconnectReason::Transport(e.to_string());
                    }
                    None => {
                        info!("transport closed by server");
                        break DisconnectReason::ServerClosed;
                    }
                }
            }
        }
    };

    // Teardown: stop loops, close the transport, publish the reason.
    for from in [SessionState::Active, SessionState::Identifying] {
        shared.state.transition(from, SessionState::Closing);
    }
    drop(outbound_rx);
    if let Some(tasks) = active.take() {
        tasks.stop(&shared.running).await;
    }
    shared.running.store(false, Ordering::Release);
    shared.queue.clear();

    if let Err(e) = transport.close().await {
        debug!("transport close failed: {e}");
    }
    shared.state.store(SessionState::Closed);

    if let Some(tx) = identified_tx.take() {
        let _ = tx.send(Err(setup_error(&reason)));
    }
    info!(%reason, "session closed");
    shared.finish(reason.clone());
    emit_disconnected(&event_tx, reason).await;

    debug!("session loop exited");
}

/// Error reported by `connect` when the loop ends before identification.
fn setup_error(reason: &DisconnectReason) -> FChatError {
    match reason {
        DisconnectReason::ServerClosed => FChatError::TransportClosed,
        DisconnectReason::Transport(msg) => FChatError::TransportReceive(msg.clone()),
        DisconnectReason::Stale => FChatError::StaleConnection,
        DisconnectReason::ClientClosed => FChatError::Timeout,
    }
}

/// Emit an event without blocking the session loop. A full channel drops the
/// event with a warning.
fn emit_event(event_tx: &mpsc::Sender<ChatEvent>, event: ChatEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(
                "event channel full, dropping event: {:?}",
                std::mem::discriminant(&dropped)
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Emit the final [`ChatEvent::Disconnected`]. Waits for channel space since
/// this event must never be dropped.
async fn emit_disconnected(event_tx: &mpsc::Sender<ChatEvent>, reason: DisconnectReason) {
    if event_tx
        .send(ChatEvent::Disconnected { reason })
        .await
        .is_err()
    {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn state_roundtrips_through_u8() {
        for state in [
            SessionState::Idle,
            SessionState::Authenticating,
            SessionState::Connecting,
            SessionState::Identifying,
            SessionState::Active,
            SessionState::Closing,
            SessionState::Closed,
            SessionState::Faulted,
        ] {
            assert_eq!(SessionState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn begin_close_is_idempotent() {
        let shared = Shared::new(SessionConfig::new("acct", "Me"));
        shared.state.store(SessionState::Active);

        assert!(shared.begin_close(DisconnectReason::Stale));
        assert!(!shared.begin_close(DisconnectReason::ClientClosed));
        assert_eq!(shared.state.load(), SessionState::Closing);
        assert_eq!(shared.take_close_reason(), Some(DisconnectReason::Stale));
    }

    #[test]
    fn begin_close_ignored_before_identifying() {
        let shared = Shared::new(SessionConfig::new("acct", "Me"));
        shared.state.store(SessionState::Connecting);
        assert!(!shared.begin_close(DisconnectReason::ClientClosed));
        assert_eq!(shared.state.load(), SessionState::Connecting);
    }

    #[test]
    fn terminal_reason_is_published_once() {
        let shared = Shared::new(SessionConfig::new("acct", "Me"));
        shared.finish(DisconnectReason::ServerClosed);
        shared.finish(DisconnectReason::ClientClosed);
        assert_eq!(
            *shared.terminal.borrow(),
            Some(DisconnectReason::ServerClosed)
        );
    }

    #[test]
    fn require_rejects_blank() {
        assert!(matches!(
            require("  ", "channel"),
            Err(FChatError::InvalidArgument("channel"))
        ));
        assert!(require("Frontpage", "channel").is_ok());
    }
}
