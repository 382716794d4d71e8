//! OpenCAPI Transaction Layer (OTL) register fields.

use tock_registers::fields::Field;

tock_registers::register_bitfields! {u64,
    pub OTL_CONFIG0 [
        EN OFFSET(63) NUMBITS(1) [],
        BLOCK_PE_HANDLE OFFSET(62) NUMBITS(1) [],
        BRICKID OFFSET(60) NUMBITS(2) [],
        PE_MASK OFFSET(56) NUMBITS(4) [],
        ERAT_HASH_0 OFFSET(50) NUMBITS(6) [],
        ERAT_HASH_1 OFFSET(44) NUMBITS(6) [],
        ERAT_HASH_2 OFFSET(38) NUMBITS(6) [],
        ERAT_HASH_3 OFFSET(32) NUMBITS(6) []
    ],

    pub OTL_CONFIG1 [
        TX_TEMP1_EN OFFSET(62) NUMBITS(1) [],
        TX_TEMP2_EN OFFSET(61) NUMBITS(1) [],
        TX_TEMP3_EN OFFSET(60) NUMBITS(1) [],
        TX_DRDY_WAIT OFFSET(56) NUMBITS(3) [],
        TX_TEMP0_RATE OFFSET(52) NUMBITS(4) [],
        TX_TEMP1_RATE OFFSET(48) NUMBITS(4) [],
        TX_TEMP2_RATE OFFSET(44) NUMBITS(4) [],
        TX_TEMP3_RATE OFFSET(40) NUMBITS(4) [],
        TX_CRET_FREQ OFFSET(29) NUMBITS(3) [],
        TX_AGE_FREQ OFFSET(24) NUMBITS(5) [],
        TX_RS2_HPWAIT OFFSET(18) NUMBITS(6) [],
        TX_RQ4_HPWAIT OFFSET(12) NUMBITS(6) [],
        TX_RQ6_HPWAIT OFFSET(6) NUMBITS(6) []
    ],

    pub OTL_TLX_CREDITS [
        VC0_CREDITS OFFSET(56) NUMBITS(8) [],
        VC3_CREDITS OFFSET(32) NUMBITS(8) [],
        DCP0_CREDITS OFFSET(24) NUMBITS(8) [],
        DCP1_CREDITS OFFSET(0) NUMBITS(8) []
    ],

    pub OTL_CONFIG2 [
        TX_SEND_EN OFFSET(63) NUMBITS(1) []
    ]
}

/// Transmit enables of templates 1..3; template 0 is always on.
pub const TX_TEMPLATE_EN: [Option<Field<u64, OTL_CONFIG1::Register>>; 4] = [
    None,
    Some(OTL_CONFIG1::TX_TEMP1_EN),
    Some(OTL_CONFIG1::TX_TEMP2_EN),
    Some(OTL_CONFIG1::TX_TEMP3_EN),
];

pub const TX_TEMPLATE_RATE: [Field<u64, OTL_CONFIG1::Register>; 4] = [
    OTL_CONFIG1::TX_TEMP0_RATE,
    OTL_CONFIG1::TX_TEMP1_RATE,
    OTL_CONFIG1::TX_TEMP2_RATE,
    OTL_CONFIG1::TX_TEMP3_RATE,
];
