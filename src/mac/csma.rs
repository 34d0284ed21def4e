//! CSMA/CA state machine.
//!
//! One egress queue, one state variable, two NAV clocks and a per-peer
//! sequence table, driven by scheduled timer deadlines and externally
//! delivered channel notifications. Channel access runs clear-channel
//! assessment for a DIFS, then a random backoff drawn from the contention
//! window; unicast transactions optionally reserve the medium with an
//! RTS/CTS exchange and complete with a positive ACK.

use core::cmp::max;

use heapless::Deque;
use log::{debug, trace, warn};
use rand_core::RngCore;

use crate::error::MacError;
use crate::frame::{Address, Ctrl, Data, Frame, FrameKind, DATA_HEADER_LEN};
use crate::mac::config::Config;
use crate::mac::dedup::SeqTable;
use crate::mac::{Mac, State, Upper};
use crate::phy::Phy;
use crate::timer::Timer;
use crate::{Ts, MAX_FRAME_LEN, MAX_PAYLOAD_LEN};

/// Hard capacity of the egress queue; `Config::queue_limit` may be lower
pub const QUEUE_DEPTH: usize = 16;

/// Outbound packet awaiting transmission, tagged as DATA at enqueue time
#[derive(Clone, Debug, PartialEq)]
struct Outgoing {
    destination: Address,
    protocol: u16,
    payload: heapless::Vec<u8, MAX_PAYLOAD_LEN>,
}

/// What the clear-channel assessment timer does when it fires
#[derive(Copy, Clone, Debug, PartialEq)]
enum CcaStep {
    /// Re-run the assessment (medium was reserved or busy)
    Assess,
    /// Channel held clear for a DIFS, enter backoff
    EnterBackoff,
}

/// Due timer event, in firing order
#[derive(Debug, PartialEq)]
enum Event {
    SendCts(Address, u16),
    SendAck(Address),
    SendData,
    Backoff,
    Cca(CcaStep),
    CtsTimeout,
    AckTimeout,
}

/// CSMA/CA MAC over a physical device `P`, timer `T`, RNG `R` and upper
/// layer `U`.
///
/// Single-threaded and event-driven: every handler runs to completion,
/// all waiting is a deadline held in one of the timer slots below.
/// Cancelling a slot is idempotent; only the backoff preserves state
/// (its remaining duration) across cancellation.
pub struct Csma<P, T, R, U> {
    address: Address,
    config: Config,

    phy: P,
    timer: T,
    rng: R,
    upper: U,

    state: State,
    cw: u16,
    sequence: u16,
    rts_retry: u16,
    data_retry: u16,

    /// Reservation heard from overheard traffic, absolute expiry
    nav: Ts,
    /// Reservation this station committed to, absolute expiry
    local_nav: Ts,

    backoff_start: Ts,
    backoff_remain: Ts,

    queue: Deque<Outgoing, QUEUE_DEPTH>,
    /// Packet of the in-progress transaction
    current: Option<Outgoing>,
    /// Header of the in-flight transmission, for stale-completion checks
    tx_frame: Option<Frame>,

    seq_table: SeqTable,

    /// Scratch buffer for frame encoding
    buffer: [u8; MAX_FRAME_LEN],

    // Timer slots
    cca_at: Option<(Ts, CcaStep)>,
    backoff_at: Option<Ts>,
    cts_timeout_at: Option<Ts>,
    ack_timeout_at: Option<Ts>,
    send_cts_at: Option<(Ts, Address, u16)>,
    send_ack_at: Option<(Ts, Address)>,
    send_data_at: Option<Ts>,
}

impl<P, T, R, U> Csma<P, T, R, U>
where
    P: Phy,
    T: Timer,
    R: RngCore,
    U: Upper,
{
    /// Create a new MAC for one network interface
    pub fn new(address: Address, config: Config, phy: P, timer: T, rng: R, upper: U) -> Self {
        let now = timer.ticks_us();
        let cw = config.cw_min;

        debug!("setup MAC {} at {} us", address, now);

        Self {
            address,
            config,
            phy,
            timer,
            rng,
            upper,

            state: State::Idle,
            cw,
            sequence: 0,
            rts_retry: 0,
            data_retry: 0,

            nav: now,
            local_nav: now,
            backoff_start: 0,
            backoff_remain: 0,

            queue: Deque::new(),
            current: None,
            tx_frame: None,

            seq_table: SeqTable::new(),

            buffer: [0u8; MAX_FRAME_LEN],

            cca_at: None,
            backoff_at: None,
            cts_timeout_at: None,
            ack_timeout_at: None,
            send_cts_at: None,
            send_ack_at: None,
            send_data_at: None,
        }
    }

    /// Station address
    pub fn address(&self) -> Address {
        self.address
    }

    /// Current device state
    pub fn state(&self) -> State {
        self.state
    }

    /// Current contention window in slots
    pub fn cw(&self) -> u16 {
        self.cw
    }

    fn set_state(&mut self, state: State) {
        if state != self.state {
            trace!("{}: state {} -> {}", self.address, self.state, state);
        }
        self.state = state;
    }

    /// Activity detected on the medium: pause a running backoff (keeping
    /// the slot-rounded remainder) and re-evaluate channel access.
    pub fn on_receive_start(&mut self) {
        self.on_channel_busy();

        match self.state {
            State::Tx | State::Collision => (),
            _ => self.set_state(State::Rx),
        }
    }

    /// Channel-busy notification without a pending reception
    pub fn on_channel_busy(&mut self) {
        if self.backoff_at.take().is_some() {
            let now = self.timer.ticks_us();
            let elapsed = now.saturating_sub(self.backoff_start);

            if elapsed < self.backoff_remain {
                self.backoff_remain = self.round_to_slot(self.backoff_remain - elapsed);
                trace!(
                    "{}: backoff paused with {} us remaining",
                    self.address,
                    self.backoff_remain
                );
            }
        }

        self.cca_for_difs();
    }

    /// Reception completed. `success` is false when the physical layer
    /// could not decode the frame; such frames are dropped silently.
    pub fn on_frame_received(&mut self, bytes: &[u8], success: bool) {
        // Receiving ends any prior RX state
        self.set_state(State::Idle);

        if !success {
            debug!("{}: reception failed, dropping frame", self.address);
            self.cca_for_difs();
            return;
        }

        let frame = match Frame::decode(bytes) {
            Ok(f) => f,
            Err(e) => {
                debug!("{}: frame decode error {:?}, dropping", self.address, e);
                self.cca_for_difs();
                return;
            }
        };

        trace!(
            "{}: received {:?} from {}",
            self.address,
            frame.kind(),
            frame.source()
        );

        match frame {
            Frame::Rts(c) => self.receive_rts(c),
            Frame::Cts(c) => self.receive_cts(c),
            Frame::Ack(c) => self.receive_ack(c),
            Frame::Data(d) => {
                let payload = if bytes.len() > DATA_HEADER_LEN {
                    &bytes[DATA_HEADER_LEN..]
                } else {
                    &[]
                };
                self.receive_data(d, payload);
            }
        }
    }

    /// A previously admitted transmission has fully left the antenna.
    ///
    /// Stale notifications (state no longer TX, or a frame that is not
    /// the tracked one) are ignored.
    pub fn on_transmission_complete(&mut self, bytes: &[u8]) {
        let frame = match Frame::decode(bytes) {
            Ok(f) => f,
            Err(_) => return,
        };

        if self.state != State::Tx || self.tx_frame != Some(frame) {
            trace!("{}: stale transmission completion, ignored", self.address);
            return;
        }

        self.set_state(State::Idle);
        self.tx_frame = None;

        match frame.kind() {
            // Their follow-up timers are already running
            FrameKind::Rts | FrameKind::Cts => (),
            FrameKind::Data => {
                if frame.destination().is_broadcast() {
                    // Broadcast never gets an ACK
                    self.send_data_done(true);
                }
            }
            FrameKind::Ack => self.cca_for_difs(),
        }
    }

    /// Clear-channel assessment for a DIFS. Step one of channel access:
    /// defers to the effective NAV, then requires an idle medium for one
    /// DIFS before backoff may start.
    fn cca_for_difs(&mut self) {
        let now = self.timer.ticks_us();

        if self.queue.is_empty() || self.cca_at.is_some() {
            return;
        }

        let nav = max(self.nav, self.local_nav);
        if nav > now + self.config.slot_time_us {
            self.cca_at = Some((nav, CcaStep::Assess));
            return;
        }

        if self.state != State::Idle || !self.phy.is_idle() {
            self.cca_at = Some((now + self.config.difs_us, CcaStep::Assess));
            return;
        }

        self.cca_at = Some((now + self.config.difs_us, CcaStep::EnterBackoff));
    }

    /// Step two: draw (or resume) the random backoff and arm its expiry
    fn backoff_start(&mut self) {
        if self.state != State::Idle || !self.phy.is_idle() {
            self.cca_for_difs();
            return;
        }

        let now = self.timer.ticks_us();

        if self.backoff_remain == 0 {
            // A zero window behaves as a single slot
            let slots = self.rng.next_u32() % self.cw.max(1) as u32;
            self.backoff_remain = slots as Ts * self.config.slot_time_us;
            trace!(
                "{}: backoff {} slots ({} us)",
                self.address,
                slots,
                self.backoff_remain
            );
        }

        self.backoff_start = now;
        self.backoff_at = Some(now + self.backoff_remain);
    }

    /// Step three: backoff expired, take one packet off the queue and
    /// open the handshake
    fn channel_access_granted(&mut self) {
        let pkt = match self.queue.pop_front() {
            Some(p) => p,
            // Queue drained meanwhile; next enqueue re-triggers access
            None => return,
        };

        self.backoff_start = 0;
        self.backoff_remain = 0;
        self.set_state(State::WaitTx);

        let unicast = !pkt.destination.is_broadcast();
        self.current = Some(pkt);

        if unicast && self.config.rts_enabled {
            self.send_rts();
        } else {
            self.send_data();
        }
    }

    fn update_nav(&mut self, duration: Ts) {
        let new = self.timer.ticks_us() + duration;
        if new > self.nav {
            self.nav = new;
        }
    }

    fn update_local_nav(&mut self, duration: Ts) {
        self.local_nav = self.timer.ticks_us() + duration;
    }

    /// Time on air of a control frame at the basic rate
    fn ctrl_duration(&self, kind: FrameKind) -> Ts {
        self.phy.tx_duration_us(
            kind.header_len(),
            0,
            self.config.basic_rate_bps,
            self.config.data_rate_bps,
        )
    }

    /// Time on air of a data frame (header and payload) at the data rate
    fn data_duration(&self, payload_len: usize) -> Ts {
        self.phy.tx_duration_us(
            0,
            DATA_HEADER_LEN + payload_len,
            self.config.basic_rate_bps,
            self.config.data_rate_bps,
        )
    }

    /// Admit a frame to the physical device.
    ///
    /// Only valid while IDLE or WAIT_TX; on admission the state moves to
    /// TX and the frame is tracked for the completion notification.
    fn send_frame(&mut self, frame: Frame, payload: Option<&[u8]>) -> bool {
        match self.state {
            State::Idle | State::WaitTx => (),
            _ => return false,
        }

        let mut n = frame.encode(&mut self.buffer);
        if let Some(p) = payload {
            self.buffer[n..n + p.len()].copy_from_slice(p);
            n += p.len();
        }

        if self.phy.transmit(&self.buffer[..n]) {
            self.set_state(State::Tx);
            self.tx_frame = Some(frame);
            true
        } else {
            debug!("{}: transmit not admitted", self.address);
            self.set_state(State::Idle);
            false
        }
    }

    /// Send an RTS reserving the whole expected transaction
    fn send_rts(&mut self) {
        let now = self.timer.ticks_us();

        let (destination, payload_len) = match self.current.as_ref() {
            Some(p) => (p.destination, p.payload.len()),
            None => return,
        };

        let nav = self.config.sifs_us
            + self.ctrl_duration(FrameKind::Cts)
            + self.config.sifs_us
            + self.data_duration(payload_len)
            + self.config.sifs_us
            + self.ctrl_duration(FrameKind::Ack)
            + self.config.slot_time_us;

        let frame = Frame::Rts(Ctrl {
            duration: nav as u16,
            source: self.address,
            destination,
            protocol: 0,
        });

        let cts_timeout = self.ctrl_duration(FrameKind::Rts)
            + self.config.sifs_us
            + self.ctrl_duration(FrameKind::Cts)
            + self.config.slot_time_us;

        if self.send_frame(frame, None) {
            self.update_local_nav(cts_timeout);
            self.cts_timeout_at = Some(now + cts_timeout);
        } else {
            self.start_over();
        }
    }

    /// Answer an RTS: the CTS carries the remaining reservation
    fn send_cts(&mut self, destination: Address, rts_duration: u16) {
        let nav = (rts_duration as Ts)
            .saturating_sub(self.config.sifs_us)
            .saturating_sub(self.ctrl_duration(FrameKind::Cts));

        let frame = Frame::Cts(Ctrl {
            duration: nav as u16,
            source: self.address,
            destination,
            protocol: 0,
        });

        if self.send_frame(frame, None) {
            self.update_local_nav((rts_duration as Ts).saturating_sub(self.config.sifs_us));
        }
    }

    /// Transmit the current data packet; unicast arms the ACK timeout,
    /// broadcast only reserves its own airtime
    fn send_data(&mut self) {
        let now = self.timer.ticks_us();

        let pkt = match self.current.take() {
            Some(p) => p,
            None => return,
        };

        if !pkt.destination.is_broadcast() {
            let nav = self.config.sifs_us + self.ctrl_duration(FrameKind::Ack);

            let frame = Frame::Data(Data {
                duration: nav as u16,
                source: self.address,
                destination: pkt.destination,
                protocol: pkt.protocol,
                sequence: self.sequence,
            });

            let admitted = self.send_frame(frame, Some(&pkt.payload));
            let ack_timeout = self.data_duration(pkt.payload.len())
                + self.config.sifs_us
                + self.ctrl_duration(FrameKind::Ack)
                + self.config.slot_time_us;

            self.current = Some(pkt);

            if admitted {
                self.update_local_nav(ack_timeout);
                self.ack_timeout_at = Some(now + ack_timeout);
            } else {
                self.start_over();
            }
        } else {
            let frame = Frame::Data(Data {
                duration: 0,
                source: self.address,
                destination: pkt.destination,
                protocol: pkt.protocol,
                sequence: self.sequence,
            });

            let admitted = self.send_frame(frame, Some(&pkt.payload));
            let airtime = self.data_duration(pkt.payload.len());

            self.current = Some(pkt);

            if admitted {
                self.update_local_nav(airtime + self.config.slot_time_us);
            } else {
                self.start_over();
            }
        }
    }

    /// Acknowledge received data, no further handshake
    fn send_ack(&mut self, destination: Address) {
        let frame = Frame::Ack(Ctrl {
            duration: 0,
            source: self.address,
            destination,
            protocol: 0,
        });

        let airtime = self.ctrl_duration(FrameKind::Ack);
        self.update_local_nav(airtime + self.config.slot_time_us);

        self.send_frame(frame, None);
    }

    /// Transmit admission failed: packet goes back on the queue and
    /// channel access restarts from scratch
    fn start_over(&mut self) {
        if let Some(pkt) = self.current.take() {
            if self.queue.push_back(pkt).is_err() {
                warn!("{}: queue full on requeue, packet dropped", self.address);
            }
        }

        self.backoff_start = 0;
        self.backoff_remain = 0;
        self.cca_for_difs();
    }

    /// Finalize the current transaction, successful or not, and resume
    /// channel access for the next queued packet
    fn send_data_done(&mut self, success: bool) {
        if success {
            debug!("{}: data transaction complete, seq {}", self.address, self.sequence);
        } else {
            warn!("{}: retry limit exceeded, packet dropped", self.address);
        }

        self.sequence = self.sequence.wrapping_add(1);
        self.current = None;
        self.rts_retry = 0;
        self.data_retry = 0;
        self.backoff_start = 0;
        self.backoff_remain = 0;
        self.cw = self.config.cw_min;

        self.cca_for_difs();
    }

    fn receive_rts(&mut self, rts: Ctrl) {
        if rts.destination != self.address {
            // Overheard reservation, defer
            self.update_nav(rts.duration as Ts);
            self.set_state(State::Idle);
            self.cca_for_difs();
            return;
        }

        // If our own NAV says the medium is busy, responding would itself
        // violate the reservation (802.11 suppression rule)
        let now = self.timer.ticks_us();
        if max(self.nav, self.local_nav) > now {
            debug!("{}: RTS from {} suppressed by NAV", self.address, rts.source);
            return;
        }

        self.update_local_nav(rts.duration as Ts);
        self.set_state(State::WaitTx);
        self.send_cts_at = Some((now + self.config.sifs_us, rts.source, rts.duration));
    }

    fn receive_cts(&mut self, cts: Ctrl) {
        if cts.destination != self.address {
            self.update_nav(cts.duration as Ts);
            self.set_state(State::Idle);
            self.cca_for_difs();
            return;
        }

        let now = self.timer.ticks_us();

        self.rts_retry = 0;
        self.update_local_nav(cts.duration as Ts);
        self.cts_timeout_at = None;
        self.set_state(State::WaitTx);
        self.send_data_at = Some(now + self.config.sifs_us);
    }

    fn receive_data(&mut self, data: Data, payload: &[u8]) {
        if data.destination.is_broadcast() {
            self.set_state(State::Idle);
            if self.seq_table.is_new(data.source, data.sequence) {
                self.upper.forward_up(payload, data.source, data.destination);
            }
            self.cca_for_difs();
            return;
        }

        if data.destination != self.address {
            // Overheard traffic
            self.update_nav(data.duration as Ts);
            self.set_state(State::Idle);
            self.cca_for_difs();
            return;
        }

        let now = self.timer.ticks_us();

        self.update_local_nav(data.duration as Ts);
        self.set_state(State::WaitTx);
        self.send_ack_at = Some((now + self.config.sifs_us, data.source));

        // Delivery happens before the ACK actually goes out; duplicates
        // are re-acknowledged but not re-delivered
        if self.seq_table.is_new(data.source, data.sequence) {
            self.upper.forward_up(payload, data.source, data.destination);
        }
    }

    fn receive_ack(&mut self, ack: Ctrl) {
        self.set_state(State::Idle);

        if ack.destination == self.address {
            self.ack_timeout_at = None;
            self.send_data_done(true);
            return;
        }

        self.cca_for_difs();
    }

    /// No CTS arrived in time: grow the contention window and re-contend,
    /// or drop the packet once past the RTS retry limit
    fn cts_timeout(&mut self) {
        self.rts_retry += 1;

        if self.rts_retry > self.config.rts_retry_limit {
            self.send_data_done(false);
            return;
        }

        debug!(
            "{}: CTS timeout, retry {}/{}",
            self.address, self.rts_retry, self.config.rts_retry_limit
        );

        if let Some(pkt) = self.current.take() {
            if self.queue.push_back(pkt).is_err() {
                warn!("{}: queue full on requeue, packet dropped", self.address);
            }
        }

        self.double_cw();
        self.backoff_start = 0;
        self.backoff_remain = 0;
        self.cca_for_difs();
    }

    /// No ACK arrived in time: retransmit the data frame directly with
    /// the same sequence number, or drop once past the data retry limit
    fn ack_timeout(&mut self) {
        self.set_state(State::Idle);
        self.data_retry += 1;

        if self.data_retry > self.config.data_retry_limit {
            self.send_data_done(false);
        } else {
            debug!(
                "{}: ACK timeout, retry {}/{}",
                self.address, self.data_retry, self.config.data_retry_limit
            );
            self.send_data();
        }
    }

    fn double_cw(&mut self) {
        self.cw = self.cw.saturating_mul(2).min(self.config.cw_max);
    }

    /// Round a duration to the nearest contention slot boundary, half up
    fn round_to_slot(&self, duration: Ts) -> Ts {
        let slot = self.config.slot_time_us;
        if slot == 0 {
            return duration;
        }

        let slots = duration / slot;
        if duration % slot >= slot / 2 {
            (slots + 1) * slot
        } else {
            slots * slot
        }
    }

    /// Take the earliest due timer event, if any. Events due at the same
    /// instant fire in `Event` declaration order (scheduled sends before
    /// expiry timeouts).
    fn take_due(&mut self, now: Ts) -> Option<Event> {
        let slots = [
            self.send_cts_at.map(|(t, _, _)| t),
            self.send_ack_at.map(|(t, _)| t),
            self.send_data_at,
            self.backoff_at,
            self.cca_at.map(|(t, _)| t),
            self.cts_timeout_at,
            self.ack_timeout_at,
        ];

        let mut best: Option<(Ts, usize)> = None;
        for (i, t) in slots.iter().enumerate() {
            if let Some(t) = t {
                if *t <= now && best.map_or(true, |(bt, _)| *t < bt) {
                    best = Some((*t, i));
                }
            }
        }

        match best? {
            (_, 0) => self.send_cts_at.take().map(|(_, d, dur)| Event::SendCts(d, dur)),
            (_, 1) => self.send_ack_at.take().map(|(_, d)| Event::SendAck(d)),
            (_, 2) => self.send_data_at.take().map(|_| Event::SendData),
            (_, 3) => self.backoff_at.take().map(|_| Event::Backoff),
            (_, 4) => self.cca_at.take().map(|(_, step)| Event::Cca(step)),
            (_, 5) => self.cts_timeout_at.take().map(|_| Event::CtsTimeout),
            _ => self.ack_timeout_at.take().map(|_| Event::AckTimeout),
        }
    }

    fn fire(&mut self, event: Event) {
        trace!("{}: firing {:?}", self.address, event);

        match event {
            Event::SendCts(dest, duration) => self.send_cts(dest, duration),
            Event::SendAck(dest) => self.send_ack(dest),
            Event::SendData => self.send_data(),
            Event::Backoff => self.channel_access_granted(),
            Event::Cca(CcaStep::Assess) => self.cca_for_difs(),
            Event::Cca(CcaStep::EnterBackoff) => self.backoff_start(),
            Event::CtsTimeout => self.cts_timeout(),
            Event::AckTimeout => self.ack_timeout(),
        }
    }
}

impl<P, T, R, U> Mac for Csma<P, T, R, U>
where
    P: Phy,
    T: Timer,
    R: RngCore,
    U: Upper,
{
    fn enqueue(
        &mut self,
        destination: Address,
        protocol: u16,
        payload: &[u8],
    ) -> Result<(), MacError> {
        let limit = self.config.queue_limit.min(QUEUE_DEPTH);
        if self.queue.len() >= limit {
            return Err(MacError::QueueFull);
        }

        let payload =
            heapless::Vec::from_slice(payload).map_err(|_| MacError::PayloadTooLarge)?;

        debug!(
            "{}: enqueue {} bytes for {}",
            self.address,
            payload.len(),
            destination
        );

        // Tagged as a DATA frame from here on
        let pkt = Outgoing {
            destination,
            protocol,
            payload,
        };

        if self.queue.push_back(pkt).is_err() {
            return Err(MacError::QueueFull);
        }

        if self.state == State::Idle {
            self.cca_for_difs();
        }

        Ok(())
    }

    fn tick(&mut self) {
        loop {
            let now = self.timer.ticks_us();
            match self.take_due(now) {
                Some(event) => self.fire(event),
                None => break,
            }
        }
    }

    fn next_deadline(&self) -> Option<Ts> {
        let slots = [
            self.send_cts_at.map(|(t, _, _)| t),
            self.send_ack_at.map(|(t, _)| t),
            self.send_data_at,
            self.backoff_at,
            self.cca_at.map(|(t, _)| t),
            self.cts_timeout_at,
            self.ack_timeout_at,
        ];

        slots.iter().flatten().copied().min()
    }
}
