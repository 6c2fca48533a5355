//! # Server
//!
//! Owns every process-wide table (packet registry, extension table, session
//! slots, worlds, groups, block definitions, event bus) and drives sessions.
//!
//! ## Threads
//! - **acceptor**: accepts TCP connections and assigns session slots
//! - **console**: optional stdin command reader
//! - **tick**: once per tick, reads at most one frame from every session,
//!   runs its handler, streams pending worlds and flushes appearance updates
//!
//! Sends may come from any of them; each session serializes its own writes.

mod broadcast;
mod capabilities;

pub use broadcast::ROTATION_AXES;
pub use capabilities::{MapAppearance, HOTBAR_SLOTS};

use std::io;
use std::net::{IpAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::config::{ConfigLookup, ServerConfig};
use crate::core::packet::SELF_ID;
use crate::error::{constants, ErrorClass, ProtocolError, Result};
use crate::events::{Event, EventBus};
use crate::groups::GroupRoster;
use crate::protocol::extensions::{self, ExtensionTable};
use crate::protocol::outbound;
use crate::protocol::registry::{HandlerContext, PacketRegistry};
use crate::protocol::transfer;
use crate::service::{console, AcceptAll, CommandHandler, CredentialVerifier, NoCommands};
use crate::session::Session;
use crate::transport::{split_tcp, split_websocket, websocket, Inbound, Outbound};
use crate::utils::metrics::Metrics;
use crate::world::blocks::BlockRegistry;
use crate::world::{Dimensions, World};

/// Software name announced in ExtInfo.
pub const SOFTWARE_NAME: &str = concat!("voxel-protocol ", env!("CARGO_PKG_VERSION"));

/// Ticks slower than this are logged.
pub const LONG_TICK: Duration = Duration::from_millis(500);

const ACCEPT_POLL: Duration = Duration::from_millis(10);

pub struct Server {
    config: ServerConfig,
    settings: Box<dyn ConfigLookup + Send + Sync>,
    registry: PacketRegistry,
    extensions: ExtensionTable,
    sessions: RwLock<Vec<Option<Arc<Session>>>>,
    main_world: Arc<World>,
    worlds: RwLock<Vec<Arc<World>>>,
    groups: RwLock<GroupRoster>,
    blocks: RwLock<BlockRegistry>,
    events: EventBus,
    verifier: Box<dyn CredentialVerifier>,
    commands: Box<dyn CommandHandler>,
    metrics: Arc<Metrics>,
    active: AtomicBool,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("name", &self.config.server.server_name)
            .field("sessions", &self.sessions().len())
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Validate `config` and build a server with a flat main world.
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.validate_strict()?;

        let world_config = &config.world;
        let main_world = Arc::new(World::flat(
            world_config.main_world.clone(),
            Dimensions::new(world_config.width, world_config.height, world_config.length),
        ));
        let slots = usize::from(config.server.max_players);

        Ok(Self {
            registry: PacketRegistry::with_defaults()?,
            extensions: ExtensionTable::standard(),
            sessions: RwLock::new(vec![None; slots]),
            worlds: RwLock::new(vec![Arc::clone(&main_world)]),
            main_world,
            groups: RwLock::new(GroupRoster::new()),
            blocks: RwLock::new(BlockRegistry::new()),
            events: EventBus::new(),
            verifier: Box::new(AcceptAll),
            commands: Box::new(NoCommands),
            metrics: Arc::new(Metrics::new()),
            active: AtomicBool::new(true),
            settings: Box::new(config.clone()),
            config,
        })
    }

    pub fn with_verifier(mut self, verifier: impl CredentialVerifier + 'static) -> Self {
        self.verifier = Box::new(verifier);
        self
    }

    pub fn with_command_handler(mut self, commands: impl CommandHandler + 'static) -> Self {
        self.commands = Box::new(commands);
        self
    }

    /// Look runtime settings up through `settings` instead of the startup
    /// config. Identity, operator and per-address limits are read per use.
    pub fn with_settings(mut self, settings: impl ConfigLookup + Send + Sync + 'static) -> Self {
        self.settings = Box::new(settings);
        self
    }

    /// Replace the main world. Must happen before any session connects.
    pub fn with_main_world(mut self, world: World) -> Self {
        let world = Arc::new(world);
        let worlds = self.worlds.get_mut().unwrap_or_else(PoisonError::into_inner);
        worlds.retain(|w| !Arc::ptr_eq(w, &self.main_world));
        worlds.insert(0, Arc::clone(&world));
        self.main_world = world;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Key-based settings consulted while serving.
    pub fn settings(&self) -> &dyn ConfigLookup {
        self.settings.as_ref()
    }

    pub fn registry(&self) -> &PacketRegistry {
        &self.registry
    }

    /// Extensions advertised to clients, in announcement order.
    pub fn extensions(&self) -> &ExtensionTable {
        &self.extensions
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn blocks(&self) -> RwLockReadGuard<'_, BlockRegistry> {
        self.blocks.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn blocks_mut(&self) -> RwLockWriteGuard<'_, BlockRegistry> {
        self.blocks.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn groups(&self) -> RwLockReadGuard<'_, GroupRoster> {
        self.groups.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write access stays inside the crate: removals must go through
    /// [`Server::remove_group`] so members fall back to no group.
    pub(crate) fn groups_mut(&self) -> RwLockWriteGuard<'_, GroupRoster> {
        self.groups.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn main_world(&self) -> Arc<World> {
        Arc::clone(&self.main_world)
    }

    pub fn add_world(&self, world: World) -> Arc<World> {
        let world = Arc::new(world);
        self.worlds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&world));
        world
    }

    pub fn worlds(&self) -> Vec<Arc<World>> {
        self.worlds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Case-insensitive lookup.
    pub fn world(&self, name: &str) -> Option<Arc<World>> {
        self.worlds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|w| w.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Snapshot of every occupied session slot.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .flatten()
            .cloned()
            .collect()
    }

    pub fn session(&self, id: u8) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(usize::from(id))
            .cloned()
            .flatten()
    }

    /// Whether another session already plays as `name`, ignoring case.
    pub fn is_name_taken(&self, name: &str, except: u8) -> bool {
        self.sessions().iter().any(|other| {
            other.id() != except
                && !other.is_closed()
                && other.name().is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
    }

    pub fn verify_credentials(&self, name: &str, key: &str) -> bool {
        self.verifier.verify(name, key)
    }

    /// Offer a command line to the command handler. `caller` is `None` for
    /// the console.
    pub fn handle_command(&self, caller: Option<&Arc<Session>>, line: &str) -> bool {
        self.commands.handle(self, caller, line)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Ask every loop to stop after its current iteration.
    pub fn stop(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Register a new connection, or kick it when the server is full or its
    /// address already holds too many connections.
    pub fn accept(
        &self,
        inbound: Box<dyn Inbound>,
        outbound: Box<dyn Outbound>,
        addr: IpAddr,
    ) -> Option<Arc<Session>> {
        let per_ip = self
            .settings
            .get_int("max-connections-per-ip")
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(usize::from(self.config.server.max_connections_per_ip));
        let mut slots = self.sessions.write().unwrap_or_else(PoisonError::into_inner);

        let from_addr = slots.iter().flatten().filter(|s| s.addr() == addr).count();
        let free = slots.iter().position(Option::is_none);

        let accepted = match free {
            _ if from_addr >= per_ip => {
                Err(constants::KICK_TOO_MANY_CONNECTIONS)
            }
            None => Err(constants::KICK_SERVER_FULL),
            Some(slot) => Ok(slot),
        };

        match accepted {
            Ok(slot) => {
                let id = u8::try_from(slot).unwrap_or(SELF_ID);
                let session = Arc::new(Session::new(
                    id,
                    addr,
                    inbound,
                    outbound,
                    Arc::clone(&self.metrics),
                ));
                slots[slot] = Some(Arc::clone(&session));
                drop(slots);

                self.metrics.connection_established();
                info!(session = id, addr = %addr, "Connection accepted");
                Some(session)
            }
            Err(reason) => {
                drop(slots);
                let rejected = Session::new(SELF_ID, addr, inbound, outbound, Arc::clone(&self.metrics));
                rejected.kick(reason);
                self.metrics.connection_rejected();
                info!(addr = %addr, reason, "Connection rejected");
                None
            }
        }
    }

    /// Accept an incoming TCP stream. Browser clients that open with an HTTP
    /// upgrade get the WebSocket transport.
    pub fn accept_tcp(&self, stream: TcpStream) -> Result<Option<Arc<Session>>> {
        stream.set_nonblocking(false)?;
        let detect = self.settings.get_bool("websocket").unwrap_or(true);
        if detect && websocket::peek_upgrade(&stream)? {
            let (inbound, outbound, peer) = split_websocket(stream)?;
            return Ok(self.accept(Box::new(inbound), Box::new(outbound), peer.ip()));
        }
        let (inbound, outbound, peer) = split_tcp(stream)?;
        Ok(self.accept(Box::new(inbound), Box::new(outbound), peer.ip()))
    }

    /// Read and handle at most one frame. Returns `Ok(false)` when no frame
    /// was waiting.
    pub fn receive(&self, session: &Arc<Session>) -> Result<bool> {
        let (id, resolved, payload) = {
            let mut inbound = session.lock_inbound();
            let Some(id) = inbound.poll_id()? else {
                return Ok(false);
            };
            let resolved = self.registry.resolve(id, |hash| session.ext_version(hash))?;
            let mut payload = vec![0u8; resolved.size];
            inbound.read_payload(&mut payload)?;
            (id, resolved, payload)
        };
        self.metrics.frame_received(payload.len() as u64 + 1);

        let ctx = HandlerContext {
            server: self,
            session,
            extended: resolved.extended,
        };
        if (resolved.handler)(&ctx, &payload) {
            Ok(true)
        } else {
            Err(ProtocolError::MalformedPayload(id))
        }
    }

    /// Close `session` because of `err`, with a reason frame when the error
    /// class calls for one.
    pub fn terminate(&self, session: &Session, err: &ProtocolError) {
        if err.class() == ErrorClass::Protocol {
            self.metrics.protocol_error();
        }
        match err.kick_reason() {
            Some(reason) => {
                debug!(session = session.id(), error = %err, "Closing session");
                session.kick(&reason);
            }
            None => {
                debug!(session = session.id(), error = %err, "Transport closed");
                session.close();
            }
        }
    }

    /// Remove a closed session from the server. Idempotent.
    pub fn disconnect(&self, session: &Arc<Session>) {
        session.close();
        let removed = {
            let mut slots = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            match slots.get_mut(usize::from(session.id())) {
                Some(slot) if slot.as_ref().is_some_and(|s| Arc::ptr_eq(s, session)) => {
                    *slot = None;
                    true
                }
                _ => false,
            }
        };
        if !removed {
            return;
        }

        self.despawn(session);
        if session.has_player() {
            let frame = outbound::remove_player_name(session.id());
            for other in self.sessions() {
                if other.supports(extensions::EXT_PLAYER_LIST, 2) {
                    other.send(&frame);
                }
            }
        }
        self.events.call(&mut Event::Disconnect { session });
        self.metrics.connection_closed();
        info!(
            session = session.id(),
            player = %session.name().unwrap_or_default(),
            "Player disconnected"
        );
    }

    /// One pass over every session.
    pub fn tick(&self, delta: Duration) {
        self.events.call(&mut Event::Tick { delta });

        for session in self.sessions() {
            if !session.is_closed() {
                if let Err(err) = self.receive(&session) {
                    self.terminate(&session, &err);
                }
            }

            let pending = session.with_data(|data| {
                data.player
                    .as_mut()
                    .and_then(|player| player.pending_world.take())
            });
            if let Some(world) = pending {
                if !session.is_closed() {
                    transfer::transfer(self, &session, &world);
                }
            }

            if session.is_closed() {
                self.disconnect(&session);
            } else {
                self.flush_updates(&session);
            }
        }

        for world in self.worlds() {
            self.flush_environment(&world);
        }
    }

    /// Tick until [`Server::stop`].
    pub fn tick_loop(&self) {
        let interval = self.config.server.tick_interval;
        let mut last = Instant::now();
        while self.is_active() {
            let now = Instant::now();
            let delta = now - last;
            last = now;
            if delta > LONG_TICK {
                warn!(delta_ms = delta.as_millis() as u64, "Tick took too long");
            }
            self.tick(delta);
            thread::sleep(interval);
        }
    }

    fn accept_loop(&self, listener: TcpListener) {
        if let Err(e) = listener.set_nonblocking(true) {
            error!(error = %e, "Cannot poll listener");
            self.stop();
            return;
        }
        while self.is_active() {
            match listener.accept() {
                Ok((stream, _)) => {
                    if let Err(e) = self.accept_tcp(stream) {
                        warn!(error = %e, "Failed to set up connection");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) => warn!(error = %e, "Accept failed"),
            }
        }
    }

    /// Serve `listener` until stopped: acceptor and console threads plus the
    /// tick loop on the calling thread.
    pub fn run(self: &Arc<Self>, listener: TcpListener) -> Result<()> {
        info!(addr = %listener.local_addr()?, name = %self.config.server.server_name, "Server started");

        let acceptor = {
            let server = Arc::clone(self);
            thread::Builder::new()
                .name("acceptor".into())
                .spawn(move || server.accept_loop(listener))?
        };
        if self.config.server.console {
            console::spawn(Arc::clone(self))?;
        }

        self.tick_loop();
        self.shutdown();

        acceptor
            .join()
            .map_err(|_| ProtocolError::Custom("acceptor thread panicked".into()))
    }

    /// Kick every connected session with the same reason.
    pub fn kick_all(&self, reason: &str) {
        for session in self.sessions() {
            session.kick(reason);
            self.disconnect(&session);
        }
    }

    /// Kick every session and log final metrics.
    pub fn shutdown(&self) {
        self.stop();
        self.kick_all(constants::KICK_SERVER_STOPPED);
        self.metrics.log_metrics();
        info!("Server stopped");
    }
}
