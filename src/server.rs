//! The control-plane multiplexer: one listening socket, up to
//! [`MAX_CLIENTS`] concurrent clients, one authoritative platform pose.
//!
//! The loop is single-threaded and readiness-driven: poll(2) over the
//! listener and every live connection is the sole suspension point. All
//! decoding, solving and actuation run to completion within one iteration,
//! so no locking is needed anywhere. Messages are processed strictly in the
//! order their sockets become readable; the most recent SET message wins
//! regardless of which client sent it.
//!
//! Outbound status replies are written in one shot. A short write is a
//! fatal server error rather than a buffered continuation — the frame is far
//! smaller than any sane socket buffer, and the original controller made
//! the same call.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::os::fd::AsFd;
use std::time::{Duration, Instant};

use nalgebra::{Matrix3, Vector3};
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use tracing::{debug, info, warn};

use crate::kinematic_traits::{InverseKinematics, Solution, Solutions};
use crate::kinematics_impl::StewartPlatform;
use crate::protocol::{
    MESSAGE_SIZE, Message, ServoStatus, Status, STATUS_STATIONARY,
};
use crate::servo_driver::{ServoDriver, pulse_width};
use crate::transform::PoseTransform;
use crate::trim_store::TrimStore;
use crate::utils::dump_solutions;

/// Maximum number of simultaneously connected clients. Connections beyond
/// this are accepted and immediately closed.
pub const MAX_CLIENTS: usize = 10;

/// Fatal control-loop failures. Per-connection problems never surface here;
/// they tear down one connection and the loop continues.
#[derive(Debug)]
pub enum ServerError {
    /// Listener or poll failure.
    Io(io::Error),
    /// The PWM driver rejected an actuation command.
    Driver(io::Error),
    /// An outbound status frame was only partially written.
    ShortWrite { written: usize, expected: usize },
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            ServerError::Io(ref e) => write!(f, "I/O error: {e}"),
            ServerError::Driver(ref e) => write!(f, "servo driver error: {e}"),
            ServerError::ShortWrite { written, expected } => {
                write!(f, "short write: {written} of {expected} bytes")
            }
        }
    }
}

impl std::error::Error for ServerError {}

impl From<io::Error> for ServerError {
    fn from(e: io::Error) -> Self {
        ServerError::Io(e)
    }
}

/// One connected client: its socket, the reassembly buffer for partial
/// frames, and at most one status reply waiting to go out.
struct ClientConnection {
    stream: TcpStream,
    peer: SocketAddr,
    /// Twice the frame size so a full frame can arrive while a partial one
    /// is already buffered.
    buffer: [u8; MESSAGE_SIZE * 2],
    /// Bytes in `buffer` not yet decoded. Always less than one frame
    /// between loop passes.
    buffered: usize,
    /// Status reply composed by GET_STATUS, sent when the socket is
    /// writable.
    pending: Option<Message>,
    /// Marked on EOF or error; the slot is reclaimed by compaction at the
    /// end of the pass.
    closed: bool,
}

impl ClientConnection {
    fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        ClientConnection {
            stream,
            peer,
            buffer: [0; MESSAGE_SIZE * 2],
            buffered: 0,
            pending: None,
            closed: false,
        }
    }
}

/// The control server: owns the listener, the connection table, the
/// platform and its single authoritative pose.
pub struct PlatformServer {
    listener: TcpListener,
    connections: Vec<ClientConnection>,
    platform: StewartPlatform,
    driver: Option<Box<dyn ServoDriver + Send>>,
    trim_store: Box<dyn TrimStore + Send>,
    /// Rotation origin for the pose. No protocol message changes it; it is
    /// reported in STATUS and kept for parity with the solver interface.
    origin: Vector3<f64>,
    transform: PoseTransform,
    solutions: Solutions,
    rotation: Matrix3<f64>,
    last_actuation: Option<Instant>,
    refresh_period: Duration,
}

impl PlatformServer {
    /// Binds the listener and assembles the server. The driver, when
    /// present, must already be opened and configured; pass `None` to run
    /// without hardware.
    pub fn bind(
        addr: impl ToSocketAddrs,
        platform: StewartPlatform,
        driver: Option<Box<dyn ServoDriver + Send>>,
        trim_store: Box<dyn TrimStore + Send>,
        refresh_hz: u32,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(PlatformServer {
            listener,
            connections: Vec::with_capacity(MAX_CLIENTS),
            platform,
            driver,
            trim_store,
            origin: Vector3::zeros(),
            transform: PoseTransform::default(),
            solutions: [Solution::default(); 6],
            rotation: Matrix3::identity(),
            last_actuation: None,
            refresh_period: Duration::from_secs(1) / refresh_hz.max(1),
        })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the control loop until a fatal error occurs.
    pub fn run(&mut self) -> Result<(), ServerError> {
        info!(addr = ?self.local_addr(), "control server running");
        loop {
            self.poll_once(PollTimeout::NONE)?;
        }
    }

    /// One full pass: wait for readiness, accept, service every ready
    /// connection, then compact the table.
    fn poll_once(&mut self, timeout: PollTimeout) -> Result<(), ServerError> {
        let mut fds = Vec::with_capacity(1 + self.connections.len());
        fds.push(PollFd::new(self.listener.as_fd(), PollFlags::POLLIN));
        for conn in &self.connections {
            let mut interest = PollFlags::POLLIN;
            if conn.pending.is_some() {
                interest |= PollFlags::POLLOUT;
            }
            fds.push(PollFd::new(conn.stream.as_fd(), interest));
        }

        poll(&mut fds, timeout).map_err(|e| ServerError::Io(e.into()))?;

        let events: Vec<PollFlags> = fds
            .iter()
            .map(|fd| fd.revents().unwrap_or(PollFlags::empty()))
            .collect();
        drop(fds);

        if events[0].contains(PollFlags::POLLIN) {
            self.accept_new()?;
        }

        for (index, revents) in events.iter().enumerate().skip(1) {
            let index = index - 1;
            // Connections accepted during this pass have no events yet.
            if index >= self.connections.len() || self.connections[index].closed {
                continue;
            }
            if revents.contains(PollFlags::POLLIN) {
                self.handle_readable(index)?;
            }
            if revents.contains(PollFlags::POLLOUT) && !self.connections[index].closed {
                self.handle_writable(index)?;
            }
            if revents.intersects(PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL) {
                self.close(index, "socket error");
            }
        }

        self.compact();
        Ok(())
    }

    /// Drains every pending connection on the listener, closing new arrivals
    /// once the table is full.
    fn accept_new(&mut self) -> Result<(), ServerError> {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if self.connections.len() == MAX_CLIENTS {
                        warn!(%peer, "too many connections, closing new connection");
                        continue;
                    }
                    stream.set_nonblocking(true)?;
                    info!(%peer, "connection accepted");
                    self.connections.push(ClientConnection::new(stream, peer));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(ServerError::Io(e)),
            }
        }
    }

    /// Reads whatever is available, decoding and dispatching a frame every
    /// time one completes. Zero-byte reads and hard errors tear the
    /// connection down.
    fn handle_readable(&mut self, index: usize) -> Result<(), ServerError> {
        loop {
            let read = {
                let conn = &mut self.connections[index];
                let start = conn.buffered;
                conn.stream.read(&mut conn.buffer[start..start + MESSAGE_SIZE])
            };

            match read {
                Ok(0) => {
                    self.close(index, "client disconnected");
                    return Ok(());
                }
                Ok(n) => {
                    let conn = &mut self.connections[index];
                    conn.buffered += n;
                    debug!(peer = %conn.peer, bytes = n, buffered = conn.buffered, "received");

                    while self.connections[index].buffered >= MESSAGE_SIZE {
                        let frame = {
                            let conn = &mut self.connections[index];
                            let mut frame = [0u8; MESSAGE_SIZE];
                            frame.copy_from_slice(&conn.buffer[..MESSAGE_SIZE]);
                            conn.buffered -= MESSAGE_SIZE;
                            let remaining = conn.buffered;
                            conn.buffer.copy_within(MESSAGE_SIZE..MESSAGE_SIZE + remaining, 0);
                            frame
                        };
                        self.handle_frame(index, &frame)?;
                        if self.connections[index].closed {
                            return Ok(());
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => {
                    self.close(index, &format!("read error: {e}"));
                    return Ok(());
                }
            }
        }
    }

    /// Decodes one frame and dispatches it. Malformed frames are logged and
    /// dropped without touching any state.
    fn handle_frame(&mut self, index: usize, frame: &[u8]) -> Result<(), ServerError> {
        match Message::decode(frame) {
            Ok(message) => self.dispatch(index, message),
            Err(e) => {
                warn!(peer = %self.connections[index].peer, "invalid message received: {e}");
                Ok(())
            }
        }
    }

    /// Applies one message to the shared platform state. SET messages
    /// re-solve and actuate; GET_STATUS queues a reply for this connection.
    fn dispatch(&mut self, index: usize, message: Message) -> Result<(), ServerError> {
        match message {
            Message::SetAxisAngle(p) => {
                info!(
                    axis = ?(p.x, p.y, p.z),
                    angle = p.angle,
                    translate = ?p.translate,
                    "axis-angle pose"
                );
                self.transform = PoseTransform::AxisAngle {
                    axis: Vector3::new(p.x as f64, p.y as f64, p.z as f64),
                    angle: p.angle as f64,
                    translate: Vector3::new(
                        p.translate[0] as f64,
                        p.translate[1] as f64,
                        p.translate[2] as f64,
                    ),
                };
                self.solve_and_actuate()
            }
            Message::SetEuclidean(p) => {
                info!(
                    yaw = p.yaw,
                    pitch = p.pitch,
                    roll = p.roll,
                    translate = ?p.translate,
                    "euclidean pose"
                );
                self.transform = PoseTransform::Euclidean {
                    yaw: p.yaw as f64,
                    pitch: p.pitch as f64,
                    roll: p.roll as f64,
                    translate: Vector3::new(
                        p.translate[0] as f64,
                        p.translate[1] as f64,
                        p.translate[2] as f64,
                    ),
                };
                self.solve_and_actuate()
            }
            Message::SetTrim { servo, angle } => {
                info!(servo, angle, "set trim");
                if servo <= 5 {
                    self.platform.set_trim(servo as usize, angle as f64);
                    if let Err(e) = self.trim_store.persist(&self.platform.config().servo_trim) {
                        warn!("could not persist trim table: {e}");
                    }
                }
                // Re-solve so the servos take up the new trim immediately.
                self.solve_and_actuate()
            }
            Message::GetStatus => {
                debug!(peer = %self.connections[index].peer, "status requested");
                let status = self.compose_status();
                self.connections[index].pending = Some(Message::Status(status));
                Ok(())
            }
            Message::Status(_) => {
                warn!("unexpected STATUS message from client, ignoring");
                Ok(())
            }
        }
    }

    /// Solves the current pose, paces to the refresh rate, then pushes the
    /// six solved angles to the driver. A driver failure here is fatal.
    fn solve_and_actuate(&mut self) -> Result<(), ServerError> {
        let outcome = self.platform.solve(&self.origin, &self.transform);
        self.solutions = outcome.solutions;
        self.rotation = outcome.rotation;
        if outcome.constrained > 0 {
            warn!(constrained = outcome.constrained, "pose not fully reachable");
        }
        dump_solutions(&self.solutions);

        self.pace();

        if let Some(driver) = self.driver.as_mut() {
            for (channel, solution) in self.solutions.iter().enumerate() {
                driver
                    .set_channel_pulse(channel as u8, 0, pulse_width(solution.angle))
                    .map_err(ServerError::Driver)?;
            }
        }
        Ok(())
    }

    /// Sleeps out the remainder of the refresh period so hardware sees at
    /// most one update per period, however fast messages arrive.
    fn pace(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_actuation {
            let deadline = last + self.refresh_period;
            if now < deadline {
                std::thread::sleep(deadline - now);
            }
        }
        self.last_actuation = Some(Instant::now());
    }

    /// Attempts to send the pending status reply in one write.
    fn handle_writable(&mut self, index: usize) -> Result<(), ServerError> {
        let Some(message) = self.connections[index].pending else {
            return Ok(());
        };
        let frame = message.encode();
        let conn = &mut self.connections[index];
        match conn.stream.write(&frame) {
            Ok(n) if n == MESSAGE_SIZE => {
                debug!(peer = %conn.peer, "status sent");
                conn.pending = None;
                Ok(())
            }
            Ok(n) => Err(ServerError::ShortWrite {
                written: n,
                expected: MESSAGE_SIZE,
            }),
            // Not actually writable yet; keep the frame and the POLLOUT
            // interest for the next pass.
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(ServerError::Io(e)),
        }
    }

    fn close(&mut self, index: usize, reason: &str) {
        let conn = &mut self.connections[index];
        if !conn.closed {
            info!(peer = %conn.peer, "closing connection: {reason}");
            conn.closed = true;
            conn.buffered = 0;
            conn.pending = None;
        }
    }

    /// Slides live connections down over closed slots, preserving their
    /// relative order, buffered bytes and pending replies.
    fn compact(&mut self) {
        let mut write = 0;
        for read in 0..self.connections.len() {
            if !self.connections[read].closed {
                if read != write {
                    self.connections.swap(read, write);
                }
                write += 1;
            }
        }
        self.connections.truncate(write);
    }

    /// Snapshot of the current pose solution for a STATUS reply.
    fn compose_status(&self) -> Status {
        let elapsed = self.platform.elapsed();
        let trim = self.platform.config().servo_trim;

        let mut servos = [ServoStatus::default(); 6];
        for (i, servo) in servos.iter_mut().enumerate() {
            servo.angle = self.solutions[i].angle as f32;
            servo.trim = trim[i] as f32;
        }

        let rotation = self.rotation.as_slice();
        Status {
            sec: elapsed.as_secs() as i64,
            usec: i64::from(elapsed.subsec_micros()),
            servos,
            status: STATUS_STATIONARY,
            origin: [
                self.origin.x as f32,
                self.origin.y as f32,
                self.origin.z as f32,
            ],
            rotation: std::array::from_fn(|i| rotation[i] as f32),
            reserved: [0.0; 3],
        }
    }
}
