//! Translation Service Layer (XSL) and XTS register fields.

tock_registers::register_bitfields! {u64,
    pub XSL_WRAP_CFG [
        XSLO_CLOCK_ENABLE OFFSET(63) NUMBITS(1) []
    ],

    pub PSL_SCNTL_A0 [
        MULTI_AFU_DIAL OFFSET(63) NUMBITS(1) []
    ],

    pub PSL_SPAP [
        /// Scheduled process area address, 4K aligned.
        ADDR OFFSET(12) NUMBITS(52) [],
        EN OFFSET(0) NUMBITS(1) []
    ],

    pub PSL_LLCMD [
        /// Invalidation command in flight.
        BUSY OFFSET(47) NUMBITS(1) [],
        /// Remove PE-handle entry from the SPA cache.
        CMD_INVALIDATE OFFSET(48) NUMBITS(1) [],
        /// Target the OTL1 cache.
        OTL1 OFFSET(15) NUMBITS(1) [],
        PE_HANDLE OFFSET(0) NUMBITS(15) []
    ],

    pub XSL_GP [
        BLOOM_FILTER_ENABLE OFFSET(47) NUMBITS(1) []
    ],

    pub XTS_CFG [
        OPENCAPI OFFSET(48) NUMBITS(1) []
    ],

    pub XTS_CFG2 [
        XSL1_ENA OFFSET(8) NUMBITS(1) [],
        XSL2_ENA OFFSET(7) NUMBITS(1) []
    ]
}
