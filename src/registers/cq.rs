//! Common Queue (CQ) register fields: the SM, CTL and DAT blocks of a stack.

tock_registers::register_bitfields! {u64,
    pub CQ_SM_MISC_CFG0 [
        CONFIG_ENABLE_PBUS OFFSET(37) NUMBITS(1) [],
        CONFIG_OCAPI_MODE OFFSET(6) NUMBITS(1) []
    ],

    pub LOW_WATER_MARKS [
        ENABLE_MACHINE_ALLOC OFFSET(12) NUMBITS(1) []
    ],

    pub PHY_BAR [
        ENABLE OFFSET(63) NUMBITS(1) [],
        /// Address bits 63..21
        ADDR OFFSET(33) NUMBITS(28) []
    ],

    pub NTL_BAR [
        ENABLE OFFSET(63) NUMBITS(1) [],
        /// Address bits 63..16
        ADDR OFFSET(28) NUMBITS(33) [],
        /// log2 of the window size in 64K units
        SIZE OFFSET(20) NUMBITS(5) []
    ],

    pub GENID_BAR [
        ENABLE OFFSET(63) NUMBITS(1) [],
        ADDR OFFSET(28) NUMBITS(33) []
    ],

    pub CQ_CTL_MISC_CFG [
        CONFIG_OCAPI_MODE OFFSET(11) NUMBITS(1) [],
        CONFIG_OTL0_ENABLE OFFSET(8) NUMBITS(1) [],
        CONFIG_OTL1_ENABLE OFFSET(7) NUMBITS(1) []
    ],

    pub CQ_CTL_STATUS [
        BRK0_AM_FENCED OFFSET(14) NUMBITS(2) [],
        BRK1_AM_FENCED OFFSET(12) NUMBITS(2) []
    ],

    pub CQ_CTL_MISC_MMIOPA [
        ADDR OFFSET(28) NUMBITS(35) [],
        SIZE OFFSET(20) NUMBITS(5) []
    ],

    pub CQ_CTL_FENCE_CONTROL [
        REQUEST_FENCE OFFSET(62) NUMBITS(2) [
            Unfenced = 0b00,
            Requested = 0b01,
            HalfFenced = 0b10,
            Fenced = 0b11
        ]
    ],

    pub CQ_CTL_CONFIG_ADDR [
        ENABLE OFFSET(63) NUMBITS(1) [],
        BUS_NUMBER OFFSET(52) NUMBITS(8) [],
        DEVICE_NUMBER OFFSET(47) NUMBITS(5) [],
        FUNCTION_NUMBER OFFSET(44) NUMBITS(3) [],
        /// Bus, device and function as one routing id.
        BDFN OFFSET(44) NUMBITS(16) [],
        REGISTER_NUMBER OFFSET(32) NUMBITS(12) []
    ],

    pub CQ_DAT_MISC_CFG [
        CONFIG_OCAPI_MODE OFFSET(23) NUMBITS(1) []
    ]
}
