//! Raw offsets and XSCOM addresses of the NPU2 register map.
//!
//! Block-relative offsets are combined with a stack and block through
//! [`reg_offset`](super::reg_offset). XSCOM addresses are chip-relative.

/* Stack numbers */
pub const NPU2_STACK_STCK_0U: u64 = 0x0;
pub const NPU2_STACK_STCK_1U: u64 = 0x1;
pub const NPU2_STACK_STCK_2U: u64 = 0x2;
pub const NPU2_STACK_MISC: u64 = 0x3;
pub const NPU2_STACK_STCK_0: u64 = 0x4;
pub const NPU2_STACK_STCK_1: u64 = 0x5;
pub const NPU2_STACK_STCK_2: u64 = 0x6;

/* Block numbers within a regular stack */
pub const NPU2_BLOCK_SM_0: u64 = 0x0;
pub const NPU2_BLOCK_SM_1: u64 = 0x1;
pub const NPU2_BLOCK_SM_2: u64 = 0x2;
pub const NPU2_BLOCK_SM_3: u64 = 0x3;
pub const NPU2_BLOCK_CTL: u64 = 0x4;
pub const NPU2_BLOCK_DAT: u64 = 0x5;
pub const NPU2_BLOCK_OTL0: u64 = 0xc;
pub const NPU2_BLOCK_OTL1: u64 = 0xd;
pub const NPU2_BLOCK_XSL: u64 = 0xe;

/* Block numbers within the MISC stack */
pub const NPU2_BLOCK_MISC: u64 = 0x0;
pub const NPU2_BLOCK_XTS: u64 = 0x2;

/* Indirect SCOM window, relative to the NPU XSCOM base */
pub const NPU2_MISC_SCOM_IND_SCOM_ADDR: u64 = 0x68;
pub const NPU2_MISC_SCOM_IND_SCOM_DATA: u64 = 0x69;
/// NPU FIR register 1 mask, relative to the NPU XSCOM base.
pub const NPU2_MISC_FIR_MASK1: u64 = 0x43;

/* CQ_SM registers (SM_0..SM_3) */
pub const NPU2_CQ_SM_MISC_CFG0: u64 = 0x000;
pub const NPU2_LOW_WATER_MARKS: u64 = 0x040;
pub const NPU2_NTL0_BAR: u64 = 0x118;
pub const NPU2_NTL1_BAR: u64 = 0x120;
pub const NPU2_PHY_BAR: u64 = 0x128;
pub const NPU2_GENID_BAR: u64 = 0x138;

/* CQ_CTL registers */
pub const NPU2_CQ_CTL_MISC_CFG: u64 = 0x000;
pub const NPU2_CQ_CTL_STATUS: u64 = 0x090;
pub const NPU2_CQ_CTL_MISC_MMIOPA0_CONFIG: u64 = 0x0b0;
pub const NPU2_CQ_CTL_MISC_MMIOPA1_CONFIG: u64 = 0x0b8;
pub const NPU2_CQ_CTL_FENCE_CONTROL_0: u64 = 0x140;
pub const NPU2_CQ_CTL_FENCE_CONTROL_1: u64 = 0x148;

/* CQ_DAT registers */
pub const NPU2_CQ_DAT_MISC_CFG: u64 = 0x008;

/* OTL registers (OTL0/OTL1 blocks) */
pub const NPU2_OTL_CONFIG0: u64 = 0x000;
pub const NPU2_OTL_TLX_CREDITS: u64 = 0x050;
pub const NPU2_OTL_CONFIG1: u64 = 0x058;
pub const NPU2_OTL_VC_CREDITS: u64 = 0x090;
pub const NPU2_OTL_CONFIG2: u64 = 0x0c0;

/* OSL fault registers, on the upper stack, OTL0/OTL1 blocks */
pub const NPU2_OTL_OSL_DSISR: u64 = 0x000;
pub const NPU2_OTL_OSL_DAR: u64 = 0x008;
pub const NPU2_OTL_OSL_TFC: u64 = 0x010;
pub const NPU2_OTL_OSL_PEHANDLE: u64 = 0x018;

/* XSL registers */
pub const NPU2_XSL_PSL_LLCMD_A0: u64 = 0x008;
pub const NPU2_XSL_PSL_SCNTL_A0: u64 = 0x010;
pub const NPU2_XSL_PSL_SPAP_A0: u64 = 0x018;
pub const NPU2_XSL_PSL_SPAP_A1: u64 = 0x020;
pub const NPU2_XSL_DEF: u64 = 0x040;
pub const NPU2_XSL_GP: u64 = 0x0b0;
pub const NPU2_XSL_WRAP_CFG: u64 = 0x0c0;

/* MISC registers (MISC stack, MISC block) */
pub const NPU2_MISC_CFG: u64 = 0x000;
pub const NPU2_MISC_BRICK0_BDF2PE_MAP0: u64 = 0x100;
pub const NPU2_MISC_BRICK_BDF2PE_STRIDE: u64 = 0x18;
pub const NPU2_MISC_OPTICAL_IO_CFG0: u64 = 0x1a8;
pub const NPU2_MISC_IRQ_BASE: u64 = 0x1b0;
pub const NPU2_MISC_FREEZE_ENABLE1: u64 = 0x1c8;
pub const NPU2_MISC_FENCE_ENABLE1: u64 = 0x1d8;
pub const NPU2_MISC_IRQ_ENABLE1: u64 = 0x1e8;
pub const NPU2_MISC_IRQ_ENABLE2: u64 = 0x1f0;

/* XTS registers (MISC stack, XTS block) */
pub const NPU2_XTS_CFG: u64 = 0x020;
pub const NPU2_XTS_CFG2: u64 = 0x028;

/* Chip-level XSCOM registers */
pub const OBUS_LL0_IOOL_PHY_CONFIG: u64 = 0x0901_080c;
pub const OBUS_LL3_IOOL_PHY_CONFIG: u64 = 0x0c01_080c;

pub const PU_IOE_PB_MISC_CFG: u64 = 0x0501_3823;
pub const PU_IOE_PB_FP01_CFG: u64 = 0x0501_380a;
pub const PU_IOE_PB_FP23_CFG: u64 = 0x0501_380b;
pub const PU_IOE_PB_FP45_CFG: u64 = 0x0501_380c;
pub const PU_IOE_PB_FP67_CFG: u64 = 0x0501_380d;

pub const OB0_ODL0_CONFIG: u64 = 0x0901_082a;
pub const OB0_ODL1_CONFIG: u64 = 0x0901_082b;
pub const OB3_ODL0_CONFIG: u64 = 0x0c01_082a;
pub const OB3_ODL1_CONFIG: u64 = 0x0c01_082b;

pub const OB0_ODL0_STATUS: u64 = 0x0901_082c;
pub const OB0_ODL1_STATUS: u64 = 0x0901_082d;
pub const OB3_ODL0_STATUS: u64 = 0x0c01_082c;
pub const OB3_ODL1_STATUS: u64 = 0x0c01_082d;

/* Magic values */

/// Must be written to XSL_GP before any other update takes effect.
pub const NPU2_XSL_GP_UNLOCK: u64 = 0x0523_7903_2300_0000;
/// XSL_DEF value working around the DD2.0/DD2.1 end-of-access bug.
pub const NPU2_XSL_DEF_EOA_FIX: u64 = 0x32f8_0000_0000_0001;
