//! Prefetch abort entry.
//!
//! The low-level vector saves the interrupted registers and calls in here
//! with the fault address and status read from CP15. A prefetch abort in
//! the kernel has no recovery path: the frame is published as the current
//! interrupt frame for register dumps, the fault is logged, and the system
//! halts.

use kestrel_core::context::RegisterSet;
use kestrel_core::fatal::{ExceptionRecord, FatalError, halt};
use kestrel_core::kfatal;
use kestrel_sched::{Cpu, SchedulerContext};

use super::ifsr::{FaultStatus, IfsrFlags};

/// Publishes `regs` as the interrupt frame, logs the abort, and returns
/// the error to escalate.
pub fn record_prefetch_abort<C: Cpu>(
    sched: &mut SchedulerContext<C>,
    regs: RegisterSet,
    ifar: u32,
    ifsr: u32,
) -> FatalError {
    sched.set_current_regs(Some(regs));

    let record = ExceptionRecord::prefetch_abort(regs, ifar, ifsr);
    let flags = IfsrFlags::from_bits_truncate(ifsr) - IfsrFlags::FS4;
    kfatal!("{}", record);
    kfatal!(
        "  {} in task {}, flags: {:?}",
        FaultStatus::from_ifsr(ifsr),
        sched.this_task(),
        flags
    );

    FatalError::Exception(record)
}

/// Handles a prefetch abort taken with `regs` as the saved frame. Never
/// returns to the faulting task.
pub fn prefetch_abort<C: Cpu>(
    sched: &mut SchedulerContext<C>,
    regs: RegisterSet,
    ifar: u32,
    ifsr: u32,
) -> ! {
    let err = record_prefetch_abort(sched, regs, ifar, ifsr);
    halt(&err)
}

/// Reads IFAR and IFSR from CP15.
#[cfg(all(target_os = "none", target_arch = "arm"))]
#[must_use]
pub fn read_fault_registers() -> (u32, u32) {
    let ifar: u32;
    let ifsr: u32;
    // SAFETY: reading the fault registers has no side effects.
    unsafe {
        core::arch::asm!(
            "mrc p15, 0, {ifar}, c6, c0, 2",
            "mrc p15, 0, {ifsr}, c5, c0, 1",
            ifar = out(reg) ifar,
            ifsr = out(reg) ifsr,
            options(nomem, nostack, preserves_flags),
        );
    }
    (ifar, ifsr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_core::context::{REG_PC, REG_SP};
    use kestrel_core::task::TaskId;
    use kestrel_sched::{SchedConfig, SoftCpu};

    fn frame(pc: u32) -> RegisterSet {
        let mut regs = RegisterSet::zeroed();
        regs[REG_PC] = pc;
        regs[REG_SP] = 0x2000_0ff0;
        regs
    }

    fn sched() -> SchedulerContext<SoftCpu> {
        SchedulerContext::new(SchedConfig::default(), SoftCpu::new())
    }

    #[test]
    fn record_publishes_frame() {
        let mut sched = sched();
        assert!(!sched.in_interrupt());

        let err = record_prefetch_abort(&mut sched, frame(0x0800_0100), 0x0800_0100, 0x0d);

        assert!(sched.in_interrupt());
        assert_eq!(sched.current_regs().map(RegisterSet::pc), Some(0x0800_0100));
        let FatalError::Exception(record) = err else {
            panic!("expected exception, got {err:?}");
        };
        assert_eq!(record.fault_address, 0x0800_0100);
        assert_eq!(record.fault_status, 0x0d);
        assert_eq!(record.regs, frame(0x0800_0100));
    }

    #[test]
    fn record_leaves_task_lists_alone() {
        let mut sched = sched();
        let _ = record_prefetch_abort(&mut sched, frame(0x10), 0x10, 0);
        assert_eq!(sched.this_task(), TaskId::IDLE);
        assert_eq!(sched.ready_list().len(), 1);
    }

    #[test]
    #[should_panic(expected = "Prefetch abort. PC: 00400020 IFAR: 00400020 IFSR: 0000000d")]
    fn prefetch_abort_halts() {
        let mut sched = sched();
        prefetch_abort(&mut sched, frame(0x0040_0020), 0x0040_0020, 0x0d);
    }
}
