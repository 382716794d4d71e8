//! MISC stack register fields: interrupts, FIR masking, PE mapping and the
//! optical transport mux.

tock_registers::register_bitfields! {u64,
    pub MISC_CFG [
        /// 64K IPI pages
        IPI_PS OFFSET(52) NUMBITS(1) [],
        IPI_OS OFFSET(51) NUMBITS(1) []
    ],

    pub MISC_IRQ_BASE [
        BASE OFFSET(12) NUMBITS(39) []
    ],

    pub MISC_IRQ_ENABLE2 [
        /// Translation interrupts, one bit per OpenCAPI brick.
        XSL_BRICKS OFFSET(60) NUMBITS(4) []
    ],

    /// Layout shared by FIR_MASK1, FREEZE_ENABLE1, FENCE_ENABLE1 and
    /// IRQ_ENABLE1.
    pub MISC_NVLINK_DL [
        STALL_NOSTALL OFFSET(52) NUMBITS(12) []
    ],

    pub MISC_BRICK_BDF2PE_MAP [
        ENABLE OFFSET(63) NUMBITS(1) [],
        PE OFFSET(56) NUMBITS(4) [],
        BDF OFFSET(40) NUMBITS(16) []
    ],

    pub MISC_OPTICAL_IO_CFG0 [
        NDLMUX_BRK0TO2 OFFSET(60) NUMBITS(3) [],
        OCMUX_BRK0TO1 OFFSET(58) NUMBITS(2) [],
        OCMUX_BRK4TO5 OFFSET(56) NUMBITS(2) []
    ]
}

/// Bits of a trigger-page address the IRQ base register accepts.
pub const NPU2_MISC_IRQ_BASE_MASK: u64 = MISC_IRQ_BASE::BASE.mask << MISC_IRQ_BASE::BASE.shift;
