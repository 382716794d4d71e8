//! OBUS link-layer, ODL and PowerBus optical register fields (XSCOM).

tock_registers::register_bitfields! {u64,
    pub OBUS_IOOL_PHY_CONFIG [
        NV0_NPU_ENABLED OFFSET(2) NUMBITS(1) [],
        NV1_NPU_ENABLED OFFSET(1) NUMBITS(1) [],
        NV2_NPU_ENABLED OFFSET(0) NUMBITS(1) [],
        ODL0_ENABLED OFFSET(11) NUMBITS(1) [],
        ODL1_ENABLED OFFSET(10) NUMBITS(1) [],
        ODL_PHY_SWAP OFFSET(9) NUMBITS(1) [],
        LINK0_OLL_ENABLED OFFSET(5) NUMBITS(1) [],
        LINK1_OLL_ENABLED OFFSET(4) NUMBITS(1) []
    ],

    pub PU_IOE_PB_MISC_CFG [
        SEL_04_NPU_NOT_PB OFFSET(50) NUMBITS(1) [],
        SEL_05_NPU_NOT_PB OFFSET(49) NUMBITS(1) []
    ],

    pub PU_IOE_PB_FP_CFG [
        FP0_FMR_DISABLE OFFSET(43) NUMBITS(1) [],
        FP0_PRS_DISABLE OFFSET(38) NUMBITS(1) [],
        FP1_FMR_DISABLE OFFSET(11) NUMBITS(1) [],
        FP1_PRS_DISABLE OFFSET(6) NUMBITS(1) []
    ],

    pub OB_ODL_CONFIG [
        RESET OFFSET(63) NUMBITS(1) [],
        VERSION OFFSET(56) NUMBITS(6) [],
        TRAIN_MODE OFFSET(52) NUMBITS(4) [
            PatternA = 0b0001,
            Auto = 0b0110,
            Start = 0b1000
        ],
        SUPPORTED_MODES OFFSET(48) NUMBITS(4) [],
        X4_BACKOFF_ENABLE OFFSET(47) NUMBITS(1) [],
        PHY_CNTR_LIMIT OFFSET(40) NUMBITS(4) [],
        DEBUG_ENABLE OFFSET(30) NUMBITS(1) [],
        FWD_PROGRESS_TIMER OFFSET(20) NUMBITS(4) []
    ],

    pub OB_ODL_STATUS [
        TRAINED_MODE OFFSET(60) NUMBITS(4) [
            X4 = 0b0001,
            X8 = 0b0010
        ],
        TRAINING_STATE_MACHINE OFFSET(12) NUMBITS(3) [
            Trained = 0x7
        ]
    ]
}
