//! Register file and state machine.
//!
//! [`Sja1000`] owns the whole controller state behind one lock: the guest
//! side calls [`read`](Sja1000::read)/[`write`](Sja1000::write) on the
//! 32-byte window, the character-endpoint side calls
//! [`can_accept`](Sja1000::can_accept)/[`deliver`](Sja1000::deliver) from
//! its poll loop. Every entry point takes the lock once, applies its
//! compound update, and reconciles the interrupt line before returning, so
//! both producers observe register side effects atomically.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use log::{debug, trace};

use crate::core::{CanChannel, CanFilter, CanFrame, FilterBankKind, IrqLine};
use crate::filter;
use crate::interrupt::{InterruptSet, IrqArbiter};
use crate::message::{basic, pelican, MAX_ENCODED_LEN};
use crate::reg::{
    Bank, BasicReg, PelicanReg, CMD_CLEAR_OVERRUN, CMD_RELEASE_RX_BUFFER, CMD_TRANSMIT_REQUEST,
    CTR_RESET, MOD_RESET, MOD_SINGLE_FILTER, REG_WINDOW_LEN, SR_OVERRUN, SR_RX_AVAILABLE,
    SR_RX_IN_PROGRESS, SR_TX_COMPLETE, SR_TX_IN_PROGRESS, SR_TX_RELEASED,
};
use crate::rx_fifo::RxFifo;

/// The only controller model this device implements.
pub const MODEL: &str = "SJA1000";

/// Reasons constructing a controller can fail.
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigurationError {
    /// The requested model string does not name a supported controller.
    UnknownModel(String),
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::UnknownModel(model) => {
                write!(f, "unsupported CAN controller model {model:?}")
            }
        }
    }
}

impl std::error::Error for ConfigurationError {}

struct State<C, L: IrqLine> {
    mode: u8,
    status_pelican: u8,
    interrupt_pelican: InterruptSet,
    interrupt_en: InterruptSet,
    clock: u8,
    control: u8,
    status_basic: u8,
    interrupt_basic: InterruptSet,
    /// PeliCAN acceptance registers: code bytes 0..4, mask bytes 4..8.
    code_mask: [u8; 8],
    code: u8,
    mask: u8,
    tx_buff: [u8; MAX_ENCODED_LEN],
    rx_fifo: RxFifo,
    /// Last filter set handed to the endpoint.
    filter: [CanFilter; 4],
    channel: C,
    irq: IrqArbiter<L>,
}

/// SJA1000 CAN controller.
///
/// Construction wires in the two capabilities the model needs from its
/// surroundings, performs the hardware reset, and leaves the controller in
/// BasicCAN reset mode with the interrupt line low.
pub struct Sja1000<C: CanChannel, L: IrqLine> {
    state: Mutex<State<C, L>>,
}

impl<C: CanChannel, L: IrqLine> Sja1000<C, L> {
    /// Creates a controller bridged to `channel` and driving `irq`.
    ///
    /// `model` must equal [`MODEL`].
    pub fn new(model: &str, channel: C, irq: L) -> Result<Self, ConfigurationError> {
        if model != MODEL {
            return Err(ConfigurationError::UnknownModel(model.into()));
        }
        let device = Self {
            state: Mutex::new(State {
                mode: 0,
                status_pelican: 0,
                interrupt_pelican: InterruptSet::empty(),
                interrupt_en: InterruptSet::empty(),
                clock: 0,
                control: 0,
                status_basic: 0,
                interrupt_basic: InterruptSet::empty(),
                code_mask: [0; 8],
                code: 0,
                mask: 0,
                tx_buff: [0; MAX_ENCODED_LEN],
                rx_fifo: RxFifo::new(),
                filter: [CanFilter::default(); 4],
                channel,
                irq: IrqArbiter::new(irq),
            }),
        };
        device.hardware_reset();
        Ok(device)
    }

    fn lock(&self) -> MutexGuard<'_, State<C, L>> {
        self.state.lock().expect("controller state lock poisoned")
    }

    /// Restores the power-on register values and lowers the interrupt line.
    ///
    /// Invoked once at construction; the embedding emulator also calls this
    /// on system-wide reset requests.
    pub fn hardware_reset(&self) {
        let mut state = self.lock();
        state.mode = 0x01;
        state.status_pelican = 0x3c;
        state.interrupt_pelican = InterruptSet::empty();
        state.clock = 0x00;
        state.control = 0x01;
        state.status_basic = 0x0c;
        state.interrupt_basic = InterruptSet::empty();
        state.rx_fifo.flush();
        state.sync_irq();
    }

    /// Guest read of one window byte.
    ///
    /// Reading the interrupt register clears it, re-asserts the receive bit
    /// when messages remain buffered, and reconciles the interrupt line.
    pub fn read(&self, offset: u64) -> u8 {
        // Bounds check is deliberately `>`: offset 32 reaches the decode
        // tables and reads as an invalid register.
        if offset > REG_WINDOW_LEN {
            return 0;
        }
        let mut state = self.lock();
        let value = match Bank::from_clock(state.clock) {
            Bank::Pelican => state.pelican_read(offset),
            Bank::Basic => state.basic_read(offset),
        };
        state.sync_irq();
        trace!("read 0x{:02x} from offset {}", value, offset);
        value
    }

    /// Guest write of one window byte.
    pub fn write(&self, offset: u64, value: u8) {
        if offset > REG_WINDOW_LEN {
            return;
        }
        trace!("write 0x{:02x} to offset {}", value, offset);
        let mut state = self.lock();
        match Bank::from_clock(state.clock) {
            Bank::Pelican => state.pelican_write(offset, value),
            Bank::Basic => state.basic_write(offset, value),
        }
        state.sync_irq();
    }

    /// Whether the endpoint may deliver a frame: true once the active bank
    /// has left reset mode.
    pub fn can_accept(&self) -> bool {
        self.lock().accepting()
    }

    /// Delivery of one byte chunk from the endpoint.
    ///
    /// Chunks shorter than one wire frame are dropped, as is anything
    /// arriving while the controller sits in reset mode.
    pub fn deliver(&self, buf: &[u8]) {
        let frame = match CanFrame::from_bytes(buf) {
            Some(frame) => frame,
            None => return,
        };
        let mut state = self.lock();
        if !state.accepting() {
            debug!("in reset, dropped {}", frame);
            return;
        }
        match Bank::from_clock(state.clock) {
            Bank::Pelican => state.pelican_receive(&frame),
            Bank::Basic => state.basic_receive(&frame),
        }
        state.sync_irq();
    }
}

impl<C: CanChannel, L: IrqLine> State<C, L> {
    fn accepting(&self) -> bool {
        match Bank::from_clock(self.clock) {
            Bank::Pelican => self.mode & MOD_RESET == 0,
            Bank::Basic => self.control & CTR_RESET == 0,
        }
    }

    /// Reconciles the interrupt line with the active bank's pending and
    /// enable bits. The single place level changes are decided.
    fn sync_irq(&mut self) {
        let asserted = match Bank::from_clock(self.clock) {
            Bank::Pelican => self.interrupt_pelican.intersects(self.interrupt_en),
            Bank::Basic => self
                .interrupt_basic
                .intersects(InterruptSet::from_basic_control(self.control)),
        };
        self.irq.sync(asserted);
    }

    fn pelican_read(&mut self, offset: u64) -> u8 {
        match PelicanReg::decode(offset) {
            PelicanReg::Mode => self.mode,
            PelicanReg::Command => 0x00,
            PelicanReg::Status => self.status_pelican,
            PelicanReg::Interrupt => {
                let value = self.interrupt_pelican.bits();
                self.interrupt_pelican = InterruptSet::empty();
                if !self.rx_fifo.is_empty() {
                    self.interrupt_pelican.set_rx(true);
                }
                value
            }
            PelicanReg::InterruptEnable => self.interrupt_en.bits(),
            PelicanReg::Reserved => 0x00,
            PelicanReg::Window(index) => {
                if self.mode & MOD_RESET != 0 {
                    if index < 8 {
                        self.code_mask[usize::from(index)]
                    } else {
                        0x00
                    }
                } else {
                    self.rx_fifo.peek(usize::from(index))
                }
            }
            PelicanReg::ClockDivider => self.clock,
            PelicanReg::Invalid => 0xff,
        }
    }

    fn basic_read(&mut self, offset: u64) -> u8 {
        match BasicReg::decode(offset) {
            BasicReg::Control => self.control,
            BasicReg::Status => self.status_basic,
            BasicReg::Interrupt => {
                let value = self.interrupt_basic.bits();
                self.interrupt_basic = InterruptSet::empty();
                if !self.rx_fifo.is_empty() {
                    self.interrupt_basic.set_rx(true);
                }
                value
            }
            BasicReg::AcceptanceCode => self.code,
            BasicReg::AcceptanceMask => self.mask,
            BasicReg::RxWindow(index) => self.rx_fifo.peek(usize::from(index)),
            BasicReg::ClockDivider => self.clock,
            BasicReg::Command | BasicReg::TxBuffer(_) | BasicReg::Invalid => 0xff,
        }
    }

    fn pelican_write(&mut self, offset: u64, value: u8) {
        match PelicanReg::decode(offset) {
            PelicanReg::Mode => {
                let leaving_reset = self.mode & MOD_RESET != 0 && value & MOD_RESET == 0;
                self.mode = 0x1f & value;
                if leaving_reset {
                    self.announce_pelican_filters();
                    self.rx_fifo.reset_counts();
                }
            }
            PelicanReg::Command => self.pelican_command(value),
            PelicanReg::InterruptEnable => self.interrupt_en = InterruptSet::from_bits(value),
            PelicanReg::Window(index) => {
                if index == 0 {
                    self.status_pelican |= SR_TX_IN_PROGRESS;
                }
                if self.mode & MOD_RESET != 0 {
                    if index < 8 {
                        self.code_mask[usize::from(index)] = value;
                    }
                } else {
                    self.tx_buff[usize::from(index)] = value;
                }
            }
            PelicanReg::ClockDivider => self.clock = value,
            PelicanReg::Status | PelicanReg::Interrupt | PelicanReg::Reserved
            | PelicanReg::Invalid => {}
        }
    }

    fn basic_write(&mut self, offset: u64, value: u8) {
        match BasicReg::decode(offset) {
            BasicReg::Control => {
                if self.control & CTR_RESET != 0 && value & CTR_RESET == 0 {
                    self.filter[0] = filter::basic_filter(self.code, self.mask);
                    self.channel
                        .set_filters(FilterBankKind::Basic, &self.filter[..1]);
                    self.rx_fifo.reset_counts();
                } else if self.control & CTR_RESET == 0 && value & CTR_RESET == 0 {
                    self.software_reset();
                }
                self.control = 0x1f & value;
            }
            BasicReg::Command => self.basic_command(value),
            BasicReg::AcceptanceCode => self.code = value,
            BasicReg::AcceptanceMask => self.mask = value,
            BasicReg::TxBuffer(index) => {
                if index == 0 {
                    self.status_basic |= SR_TX_IN_PROGRESS;
                }
                if self.control & CTR_RESET == 0 {
                    self.tx_buff[usize::from(index)] = value;
                }
            }
            BasicReg::ClockDivider => self.clock = value,
            BasicReg::Status | BasicReg::Interrupt | BasicReg::RxWindow(_)
            | BasicReg::Invalid => {}
        }
    }

    /// The reset writable from the BasicCAN control register. Touches the
    /// PeliCAN mode and status registers as well; the banks share silicon.
    fn software_reset(&mut self) {
        self.mode &= !0x31;
        self.mode |= 0x01;
        self.status_pelican &= !0x37;
        self.status_pelican |= 0x34;
        self.rx_fifo.flush();
    }

    /// Builds and announces the host filter set for the acceptance bank
    /// selected by the mode register. Called on the reset→operation edge.
    fn announce_pelican_filters(&mut self) {
        if self.mode & MOD_SINGLE_FILTER != 0 {
            let set = filter::single_filter_set(&self.code_mask);
            self.filter[..2].copy_from_slice(&set);
            self.channel
                .set_filters(FilterBankKind::Single, &self.filter[..2]);
        } else {
            self.filter = filter::dual_filter_set(&self.code_mask);
            self.channel.set_filters(FilterBankKind::Dual, &self.filter);
        }
    }

    fn pelican_command(&mut self, value: u8) {
        if value & CMD_TRANSMIT_REQUEST != 0 {
            let frame = pelican::decode(&self.tx_buff);
            debug!("transmit {}", frame);
            self.status_pelican &= !(SR_TX_RELEASED | SR_TX_COMPLETE);
            self.channel.write(&frame.to_bytes());
            self.status_pelican |= SR_TX_RELEASED | SR_TX_COMPLETE;
            self.status_pelican &= !SR_TX_IN_PROGRESS;
            // Latched regardless of what was already pending.
            self.interrupt_pelican.set_tx(true);
        } else if value & CMD_RELEASE_RX_BUFFER != 0 {
            if self.rx_fifo.release(Bank::Pelican).is_ok() && self.rx_fifo.is_empty() {
                self.status_pelican &= !SR_RX_AVAILABLE;
                self.interrupt_pelican.set_rx(false);
            }
        } else if value & CMD_CLEAR_OVERRUN != 0 {
            self.status_pelican &= !SR_OVERRUN;
            self.interrupt_pelican.set_overrun(false);
        }
    }

    fn basic_command(&mut self, value: u8) {
        if value & CMD_TRANSMIT_REQUEST != 0 {
            let frame = basic::decode(&self.tx_buff);
            debug!("transmit {}", frame);
            self.status_basic &= !(SR_TX_RELEASED | SR_TX_COMPLETE);
            self.channel.write(&frame.to_bytes());
            self.status_basic |= SR_TX_RELEASED | SR_TX_COMPLETE;
            self.status_basic &= !SR_TX_IN_PROGRESS;
            self.interrupt_basic.set_tx(true);
        } else if value & CMD_RELEASE_RX_BUFFER != 0 {
            if self.rx_fifo.release(Bank::Basic).is_ok() && self.rx_fifo.is_empty() {
                self.status_basic &= !SR_RX_AVAILABLE;
                self.interrupt_basic.set_rx(false);
            }
        } else if value & CMD_CLEAR_OVERRUN != 0 {
            self.status_basic &= !SR_OVERRUN;
            self.interrupt_basic.set_overrun(false);
        }
    }

    fn pelican_receive(&mut self, frame: &CanFrame) {
        self.status_pelican |= SR_RX_IN_PROGRESS;
        if !filter::accepts(true, self.mode, &self.code_mask, frame) {
            debug!("filtered out {}", frame);
            self.status_pelican &= !SR_RX_IN_PROGRESS;
            return;
        }
        let mut encoded = [0; MAX_ENCODED_LEN];
        let len = match pelican::encode(frame, &mut encoded) {
            Ok(len) => len,
            Err(_) => {
                debug!("unsupported, dropped {}", frame);
                self.status_pelican &= !SR_RX_IN_PROGRESS;
                return;
            }
        };
        if self.rx_fifo.push(&encoded[..len]).is_err() {
            debug!("overrun, dropped {}", frame);
            self.status_pelican |= SR_OVERRUN;
            self.interrupt_pelican.set_overrun(true);
            self.status_pelican &= !SR_RX_IN_PROGRESS;
            return;
        }
        debug!("received {}", frame);
        self.status_pelican |= SR_RX_AVAILABLE;
        self.interrupt_pelican.set_rx(true);
        self.status_pelican &= !SR_RX_IN_PROGRESS;
    }

    fn basic_receive(&mut self, frame: &CanFrame) {
        self.status_basic |= SR_RX_IN_PROGRESS;
        let mut encoded = [0; MAX_ENCODED_LEN];
        let len = match basic::encode(frame, &mut encoded) {
            Ok(len) => len,
            Err(_) => {
                debug!("unsupported, dropped {}", frame);
                self.status_basic &= !SR_RX_IN_PROGRESS;
                return;
            }
        };
        if self.rx_fifo.push(&encoded[..len]).is_err() {
            debug!("overrun, dropped {}", frame);
            self.status_basic |= SR_OVERRUN;
            self.interrupt_basic.set_overrun(true);
            self.status_basic &= !SR_RX_IN_PROGRESS;
            return;
        }
        debug!("received {}", frame);
        self.status_basic |= SR_RX_AVAILABLE;
        self.interrupt_basic.set_rx(true);
        self.status_basic &= !SR_RX_IN_PROGRESS;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::{CAN_EFF_FLAG, CAN_ERR_FLAG, CAN_RTR_FLAG, WIRE_FRAME_LEN};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct TestChannel {
        frames: Arc<Mutex<Vec<[u8; WIRE_FRAME_LEN]>>>,
        filters: Arc<Mutex<Vec<(FilterBankKind, Vec<CanFilter>)>>>,
    }

    impl CanChannel for TestChannel {
        fn write(&mut self, frame: &[u8; WIRE_FRAME_LEN]) {
            self.frames.lock().unwrap().push(*frame);
        }
        fn set_filters(&mut self, kind: FilterBankKind, filters: &[CanFilter]) {
            self.filters.lock().unwrap().push((kind, filters.to_vec()));
        }
    }

    impl TestChannel {
        fn frames(&self) -> Vec<[u8; WIRE_FRAME_LEN]> {
            self.frames.lock().unwrap().clone()
        }
        fn filters(&self) -> Vec<(FilterBankKind, Vec<CanFilter>)> {
            self.filters.lock().unwrap().clone()
        }
    }

    #[derive(Clone, Default)]
    struct TestIrq {
        level: Arc<AtomicBool>,
    }

    impl IrqLine for TestIrq {
        fn raise(&mut self) {
            self.level.store(true, Ordering::SeqCst);
        }
        fn lower(&mut self) {
            self.level.store(false, Ordering::SeqCst);
        }
    }

    impl TestIrq {
        fn level(&self) -> bool {
            self.level.load(Ordering::SeqCst)
        }
    }

    fn setup() -> (Sja1000<TestChannel, TestIrq>, TestChannel, TestIrq) {
        let channel = TestChannel::default();
        let irq = TestIrq::default();
        let device = Sja1000::new(MODEL, channel.clone(), irq.clone()).unwrap();
        (device, channel, irq)
    }

    fn make_frame(id: u32, data: &[u8]) -> CanFrame {
        let mut frame = CanFrame {
            can_id: id,
            can_dlc: data.len() as u8,
            data: [0; 8],
        };
        frame.data[..data.len()].copy_from_slice(data);
        frame
    }

    fn fifo_counts(device: &Sja1000<TestChannel, TestIrq>) -> (usize, usize) {
        let state = device.state.lock().unwrap();
        (state.rx_fifo.message_count(), state.rx_fifo.byte_count())
    }

    /// PeliCAN operation mode with an all-open single filter and the given
    /// interrupt enables.
    fn pelican_operational(device: &Sja1000<TestChannel, TestIrq>, interrupt_en: u8) {
        device.write(31, 0x80);
        for offset in 16..20 {
            device.write(offset, 0x00);
        }
        for offset in 20..24 {
            device.write(offset, 0xff);
        }
        device.write(4, interrupt_en);
        device.write(0, 0x08);
    }

    #[test]
    fn rejects_unknown_model() {
        let err = Sja1000::new("SJA1001", TestChannel::default(), TestIrq::default());
        assert_eq!(
            err.err(),
            Some(ConfigurationError::UnknownModel("SJA1001".into()))
        );
    }

    #[test]
    fn hardware_reset_values() {
        let (device, _, irq) = setup();
        assert_eq!(device.read(0), 0x01); // BasicCAN control, reset mode
        assert_eq!(device.read(2), 0x0c);
        assert_eq!(device.read(3), 0x00);
        assert_eq!(device.read(31), 0x00);
        assert!(!irq.level());
        assert!(!device.can_accept());

        device.write(31, 0x80);
        assert_eq!(device.read(0), 0x01); // PeliCAN mode, reset mode
        assert_eq!(device.read(2), 0x3c);
        assert_eq!(device.read(3), 0x00);
        assert!(!device.can_accept());
    }

    #[test]
    fn pelican_bring_up_and_transmit() {
        let (device, channel, irq) = setup();
        device.write(31, 0x80);
        device.write(0, 0x00);
        assert!(device.can_accept());

        let bytes = [
            0x08, 0x22, 0xa0, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88,
        ];
        for (index, byte) in bytes.iter().enumerate() {
            device.write(16 + index as u64, *byte);
        }
        device.write(1, 0x01);

        let frames = channel.frames();
        assert_eq!(frames.len(), 1);
        let sent = CanFrame::from_bytes(&frames[0]).unwrap();
        assert_eq!(sent.can_id, 0x115);
        assert_eq!(sent.can_dlc, 8);
        assert_eq!(sent.data, [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]);

        // Transmit released and complete, transmit-in-progress cleared.
        assert_eq!(device.read(2), 0x1c);
        assert_eq!(device.read(3), 0x02);
        assert_eq!(device.read(3), 0x00);
        assert!(!irq.level());
    }

    #[test]
    fn pelican_receive_and_release() {
        let (device, _, irq) = setup();
        pelican_operational(&device, 0x01);

        device.deliver(&make_frame(0x123, &[0xaa, 0xbb, 0xcc]).to_bytes());
        assert_eq!(fifo_counts(&device), (1, 6));
        assert_eq!(device.read(2) & 0x01, 0x01);
        assert!(irq.level());

        let window: Vec<u8> = (16..22).map(|offset| device.read(offset)).collect();
        assert_eq!(window, [0x03, 0x24, 0x60, 0xaa, 0xbb, 0xcc]);

        device.write(1, 0x04);
        assert_eq!(fifo_counts(&device), (0, 0));
        assert_eq!(device.read(2) & 0x01, 0x00);
        assert!(!irq.level());
    }

    #[test]
    fn fifo_accounting_over_mixed_traffic() {
        let (device, _, _) = setup();
        pelican_operational(&device, 0x00);

        device.deliver(&make_frame(0x100, &[1, 2]).to_bytes()); // 5 bytes
        device.deliver(&make_frame(0x200 | CAN_RTR_FLAG, &[]).to_bytes()); // 3 bytes
        device.deliver(&make_frame(CAN_EFF_FLAG | 0x1234, &[9]).to_bytes()); // 6 bytes
        assert_eq!(fifo_counts(&device), (3, 14));
        assert_eq!(device.read(2) & 0x01, 0x01);

        device.write(1, 0x04);
        assert_eq!(fifo_counts(&device), (2, 9));
        assert_eq!(device.read(2) & 0x01, 0x01);
        device.write(1, 0x04);
        device.write(1, 0x04);
        assert_eq!(fifo_counts(&device), (0, 0));
        assert_eq!(device.read(2) & 0x01, 0x00);
        // Releasing an empty queue changes nothing.
        device.write(1, 0x04);
        assert_eq!(fifo_counts(&device), (0, 0));
    }

    #[test]
    fn overrun_latches_and_clears() {
        let (device, _, irq) = setup();
        pelican_operational(&device, 0x08);

        // Standard dlc-8 frames occupy 11 bytes; five fit in 64, six do not.
        let frame = make_frame(0x111, &[1, 2, 3, 4, 5, 6, 7, 8]);
        for _ in 0..5 {
            device.deliver(&frame.to_bytes());
        }
        assert_eq!(fifo_counts(&device), (5, 55));
        assert!(!irq.level());

        device.deliver(&frame.to_bytes());
        assert_eq!(fifo_counts(&device), (5, 55));
        assert_eq!(device.read(2) & 0x02, 0x02);
        assert!(irq.level());
        assert_eq!(device.read(3), 0x09);

        device.write(1, 0x08);
        assert_eq!(device.read(2) & 0x02, 0x00);
        assert!(!irq.level());
        assert_eq!(device.read(3), 0x01);
    }

    #[test]
    fn basic_receive_and_release() {
        let (device, channel, _) = setup();
        device.write(4, 0x00);
        device.write(5, 0xff);
        device.write(0, 0x00);

        let filters = channel.filters();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].0, FilterBankKind::Basic);
        assert_eq!(filters[0].1, vec![filter::basic_filter(0x00, 0xff)]);

        device.deliver(&make_frame(0x055, &[0xde, 0xad]).to_bytes());
        assert_eq!(fifo_counts(&device), (1, 4));
        let window: Vec<u8> = (20..24).map(|offset| device.read(offset)).collect();
        assert_eq!(window, [0x0a, 0xa2, 0xde, 0xad]);

        device.write(1, 0x04);
        assert_eq!(fifo_counts(&device), (0, 0));
        assert_eq!(device.read(2) & 0x01, 0x00);
    }

    #[test]
    fn basic_refuses_extended_frames() {
        let (device, _, _) = setup();
        device.write(0, 0x00);
        device.deliver(&make_frame(CAN_EFF_FLAG | 0x1234, &[1]).to_bytes());
        assert_eq!(fifo_counts(&device), (0, 0));
    }

    #[test]
    fn error_frames_never_buffer() {
        let (device, _, _) = setup();
        pelican_operational(&device, 0x00);
        device.deliver(&make_frame(CAN_ERR_FLAG | 0x060, &[]).to_bytes());
        assert_eq!(fifo_counts(&device), (0, 0));
    }

    #[test]
    fn mode_rewrite_announces_single_filter_set() {
        let (device, channel, _) = setup();
        device.write(31, 0x80);
        device.write(0, 0x01);
        let code_mask = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];
        for (index, byte) in code_mask.iter().enumerate() {
            device.write(16 + index as u64, *byte);
        }
        device.write(0, 0x08);

        let filters = channel.filters();
        assert_eq!(filters.len(), 1);
        let (kind, set) = &filters[0];
        assert_eq!(*kind, FilterBankKind::Single);
        assert_eq!(set, &filter::single_filter_set(&code_mask).to_vec());
        // First entry covers the extended range, second the standard one.
        assert_eq!(set[0].can_id & CAN_EFF_FLAG, CAN_EFF_FLAG);
        assert_eq!(set[0].can_mask & CAN_EFF_FLAG, CAN_EFF_FLAG);
        assert_eq!(set[1].can_id & CAN_EFF_FLAG, 0);
        assert_eq!(set[1].can_mask & CAN_EFF_FLAG, CAN_EFF_FLAG);

        // Re-entering and leaving reset announces again.
        device.write(0, 0x01);
        device.write(0, 0x00);
        let filters = channel.filters();
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[1].0, FilterBankKind::Dual);
        assert_eq!(filters[1].1.len(), 4);
    }

    #[test]
    fn staying_in_operation_mode_announces_nothing() {
        let (device, channel, _) = setup();
        device.write(31, 0x80);
        device.write(0, 0x00);
        assert_eq!(channel.filters().len(), 1);
        device.write(0, 0x08);
        device.write(0, 0x00);
        assert_eq!(channel.filters().len(), 1);
    }

    #[test]
    fn interrupt_register_clear_on_read() {
        let (device, _, irq) = setup();
        pelican_operational(&device, 0x03);

        device.deliver(&make_frame(0x100, &[1]).to_bytes());
        device.deliver(&make_frame(0x101, &[2]).to_bytes());
        device.write(1, 0x01); // transmit whatever is staged
        assert_eq!(fifo_counts(&device).0, 2);

        assert_eq!(device.read(3), 0x03);
        assert!(irq.level());
        assert_eq!(device.read(3), 0x01);
        assert!(irq.level());

        device.write(1, 0x04);
        device.write(1, 0x04);
        assert_eq!(device.read(3), 0x00);
        assert!(!irq.level());
    }

    #[test]
    fn enable_mask_gates_the_line() {
        let (device, _, irq) = setup();
        pelican_operational(&device, 0x00);
        device.deliver(&make_frame(0x100, &[1]).to_bytes());
        assert!(!irq.level());

        // Enabling a pending interrupt raises the line at once.
        device.write(4, 0x01);
        assert!(irq.level());
        device.write(4, 0x00);
        assert!(!irq.level());
    }

    #[test]
    fn single_filter_matches_on_data_bytes() {
        let (device, _, _) = setup();
        device.write(31, 0x80);
        // Demand 0xa0 in the upper nibble of the first data byte.
        let code_mask = [0, 0, 0xa0, 0, 0, 0, 0x0f, 0xff];
        for (index, byte) in code_mask.iter().enumerate() {
            device.write(16 + index as u64, *byte);
        }
        device.write(0, 0x08);

        device.deliver(&make_frame(0x123, &[0xa7]).to_bytes());
        assert_eq!(fifo_counts(&device), (1, 4));
        device.deliver(&make_frame(0x123, &[0x17]).to_bytes());
        assert_eq!(fifo_counts(&device), (1, 4));
        // Remote frames bypass the data match.
        device.deliver(&make_frame(0x123 | CAN_RTR_FLAG, &[]).to_bytes());
        assert_eq!(fifo_counts(&device), (2, 7));
    }

    #[test]
    fn status_register_tracks_the_selected_bank() {
        let (device, _, _) = setup();
        assert_eq!(device.read(2), 0x0c);
        device.write(31, 0x80);
        assert_eq!(device.read(2), 0x3c);
        device.write(31, 0x00);
        assert_eq!(device.read(2), 0x0c);
    }

    #[test]
    fn acceptance_registers_locked_in_operation_mode() {
        let (device, _, _) = setup();
        device.write(31, 0x80);
        device.write(16, 0x55);
        assert_eq!(device.read(16), 0x55);
        device.write(0, 0x00);
        // Operation mode: the same offset now stages TX bytes and the
        // acceptance byte is unreachable until reset mode returns.
        device.write(16, 0xaa);
        device.write(0, 0x01);
        assert_eq!(device.read(16), 0x55);
    }

    #[test]
    fn reserved_and_invalid_offsets() {
        let (device, _, _) = setup();
        device.write(31, 0x80);
        for offset in 5..16 {
            device.write(offset, 0xaa);
            assert_eq!(device.read(offset), 0x00);
        }
        assert_eq!(device.read(1), 0x00);
        assert_eq!(device.read(29), 0xff);
        assert_eq!(device.read(30), 0xff);
        // The bounds check lets offset 32 through to the decode table.
        assert_eq!(device.read(32), 0xff);
        assert_eq!(device.read(33), 0x00);
        device.write(33, 0xaa);

        device.write(31, 0x00);
        assert_eq!(device.read(1), 0xff);
        assert_eq!(device.read(6), 0xff);
        assert_eq!(device.read(15), 0xff);
        assert_eq!(device.read(30), 0xff);
    }

    #[test]
    fn short_chunks_are_dropped() {
        let (device, _, _) = setup();
        pelican_operational(&device, 0x00);
        device.deliver(&[0u8; WIRE_FRAME_LEN - 1]);
        assert_eq!(fifo_counts(&device), (0, 0));
    }

    #[test]
    fn delivery_in_reset_mode_is_dropped() {
        let (device, _, _) = setup();
        pelican_operational(&device, 0x00);
        device.write(0, 0x01);
        device.deliver(&make_frame(0x123, &[1]).to_bytes());
        assert_eq!(fifo_counts(&device), (0, 0));
        assert!(!device.can_accept());
    }

    #[test]
    fn leaving_reset_discards_buffered_counts() {
        let (device, _, _) = setup();
        pelican_operational(&device, 0x00);
        device.deliver(&make_frame(0x123, &[1]).to_bytes());
        assert_eq!(fifo_counts(&device).0, 1);
        device.write(0, 0x01);
        device.write(0, 0x00);
        assert_eq!(fifo_counts(&device), (0, 0));
    }

    #[test]
    fn software_reset_from_basic_control() {
        let (device, _, _) = setup();
        device.write(0, 0x00); // leave reset
        device.deliver(&make_frame(0x055, &[1]).to_bytes());
        assert_eq!(fifo_counts(&device).0, 1);
        // Bit 0 stays clear: software reset, not a mode transition.
        device.write(0, 0x00);
        assert_eq!(fifo_counts(&device), (0, 0));
        device.write(31, 0x80);
        assert_eq!(device.read(0), 0x01);
        assert_eq!(device.read(2) & 0x37, 0x34);
    }

    #[test]
    fn command_bits_resolve_in_priority_order() {
        let (device, channel, _) = setup();
        pelican_operational(&device, 0x00);
        device.deliver(&make_frame(0x123, &[1]).to_bytes());
        // Transmit and release requested together: only the transmit runs.
        device.write(1, 0x05);
        assert_eq!(channel.frames().len(), 1);
        assert_eq!(fifo_counts(&device).0, 1);
    }

    #[test]
    fn basic_transmit_encodes_staged_buffer() {
        let (device, channel, irq) = setup();
        device.write(0, 0x04); // operation mode, TX interrupt enabled
        for (index, byte) in [0x0a, 0xa2, 0xde, 0xad].iter().enumerate() {
            device.write(10 + index as u64, *byte);
        }
        device.write(1, 0x01);

        let frames = channel.frames();
        assert_eq!(frames.len(), 1);
        let sent = CanFrame::from_bytes(&frames[0]).unwrap();
        assert_eq!(sent.can_id, 0x055);
        assert_eq!(sent.can_dlc, 2);
        assert_eq!(sent.data[..2], [0xde, 0xad]);
        assert!(irq.level());
        assert_eq!(device.read(3), 0x02);
        assert!(!irq.level());
    }
}
