//! Interrupt pending bits and the output line arbiter.
//!
//! Both register banks share the same pending-bit assignment; they differ in
//! where the enable bits live. The PeliCAN bank has a dedicated enable
//! register with the same layout, while the BasicCAN bank scatters its
//! enables across the control register, normalized here by
//! [`InterruptSet::from_basic_control`].

use bitfield::bitfield;

use crate::core::IrqLine;
use crate::reg::{CTR_OVERRUN_IRQ_EN, CTR_RX_IRQ_EN, CTR_TX_IRQ_EN};

bitfield! {
    /// A set of controller interrupts, as held in the interrupt and
    /// interrupt-enable registers.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct InterruptSet(u8);

    /// Receive: a message sits in the receive buffer
    pub rx, set_rx: 0;
    /// Transmit: the transmit buffer was released
    pub tx, set_tx: 1;
    /// Data overrun: a message was lost to a full receive buffer
    pub overrun, set_overrun: 3;
}

impl InterruptSet {
    /// The empty set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Set with the given raw register value.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw register value.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Enable set packed in a BasicCAN control register value.
    pub fn from_basic_control(control: u8) -> Self {
        let mut set = Self::empty();
        set.set_rx(control & CTR_RX_IRQ_EN != 0);
        set.set_tx(control & CTR_TX_IRQ_EN != 0);
        set.set_overrun(control & CTR_OVERRUN_IRQ_EN != 0);
        set
    }

    /// Whether any bit of `self` is enabled by `enable`.
    pub const fn intersects(self, enable: InterruptSet) -> bool {
        self.0 & enable.0 != 0
    }
}

impl core::fmt::Debug for InterruptSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "InterruptSet {{ ")?;
        if self.rx() {
            write!(f, "RX ")?;
        }
        if self.tx() {
            write!(f, "TX ")?;
        }
        if self.overrun() {
            write!(f, "OVERRUN ")?;
        }
        write!(f, "}}")
    }
}

/// Owns the interrupt line and keeps its level consistent with the
/// controller state.
///
/// All level changes funnel through [`sync`](Self::sync); edges reach the
/// sink only when the aggregate pending ∧ enable level actually changes.
pub struct IrqArbiter<L: IrqLine> {
    line: L,
    level: bool,
}

impl<L: IrqLine> IrqArbiter<L> {
    /// Takes ownership of the line and drives it low.
    pub fn new(mut line: L) -> Self {
        line.lower();
        Self { line, level: false }
    }

    /// Reconciles the line with the current aggregate level.
    pub fn sync(&mut self, asserted: bool) {
        if asserted == self.level {
            return;
        }
        self.level = asserted;
        if asserted {
            self.line.raise();
        } else {
            self.line.lower();
        }
    }

    /// The level last driven onto the line.
    pub fn level(&self) -> bool {
        self.level
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct EdgeCounter {
        raises: Arc<AtomicUsize>,
        lowers: Arc<AtomicUsize>,
    }

    impl IrqLine for EdgeCounter {
        fn raise(&mut self) {
            self.raises.fetch_add(1, Ordering::SeqCst);
        }
        fn lower(&mut self) {
            self.lowers.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn basic_control_enable_mapping() {
        let set = InterruptSet::from_basic_control(CTR_RX_IRQ_EN | CTR_OVERRUN_IRQ_EN);
        assert!(set.rx());
        assert!(!set.tx());
        assert!(set.overrun());
        assert_eq!(set.bits(), 0x09);
    }

    #[test]
    fn intersects_requires_an_enabled_pending_bit() {
        let mut pending = InterruptSet::empty();
        pending.set_tx(true);
        assert!(pending.intersects(InterruptSet::from_bits(0x02)));
        assert!(!pending.intersects(InterruptSet::from_bits(0x01)));
        assert!(!InterruptSet::empty().intersects(InterruptSet::from_bits(0xff)));
    }

    #[test]
    fn arbiter_emits_edges_only_on_level_change() {
        let line = EdgeCounter::default();
        let (raises, lowers) = (line.raises.clone(), line.lowers.clone());
        let mut arbiter = IrqArbiter::new(line);
        assert_eq!(lowers.load(Ordering::SeqCst), 1);

        arbiter.sync(false);
        arbiter.sync(false);
        assert_eq!(lowers.load(Ordering::SeqCst), 1);

        arbiter.sync(true);
        arbiter.sync(true);
        assert_eq!(raises.load(Ordering::SeqCst), 1);
        assert!(arbiter.level());

        arbiter.sync(false);
        assert_eq!(lowers.load(Ordering::SeqCst), 2);
        assert!(!arbiter.level());
    }
}
