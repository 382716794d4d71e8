//! Brick-index algebra.
//!
//! Only bricks 2..5 can run OpenCAPI. Each one lives on a fixed stack (and
//! upper stack), uses a fixed OTL block and is cabled to a fixed ODL on OBUS 0
//! or OBUS 3. [`BrickIndex`] can only hold a valid index, so every mapping
//! here is total; invalid indices are rejected by `TryFrom<u32>`.

use crate::config::PlatformOcapi;
use crate::err::OcapiError;
use crate::registers::consts::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum BrickIndex {
    Brick2 = 2,
    Brick3 = 3,
    Brick4 = 4,
    Brick5 = 5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stack {
    Stck0,
    Stck1,
    Stck2,
    Stck0U,
    Stck1U,
    Stck2U,
    Misc,
}

impl Stack {
    pub const fn value(self) -> u64 {
        match self {
            Stack::Stck0 => NPU2_STACK_STCK_0,
            Stack::Stck1 => NPU2_STACK_STCK_1,
            Stack::Stck2 => NPU2_STACK_STCK_2,
            Stack::Stck0U => NPU2_STACK_STCK_0U,
            Stack::Stck1U => NPU2_STACK_STCK_1U,
            Stack::Stck2U => NPU2_STACK_STCK_2U,
            Stack::Misc => NPU2_STACK_MISC,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Block {
    Sm0,
    Sm1,
    Sm2,
    Sm3,
    Ctl,
    Dat,
    Otl0,
    Otl1,
    Xsl,
    Misc,
    Xts,
}

impl Block {
    pub const SM: [Block; 4] = [Block::Sm0, Block::Sm1, Block::Sm2, Block::Sm3];

    pub const fn value(self) -> u64 {
        match self {
            Block::Sm0 => NPU2_BLOCK_SM_0,
            Block::Sm1 => NPU2_BLOCK_SM_1,
            Block::Sm2 => NPU2_BLOCK_SM_2,
            Block::Sm3 => NPU2_BLOCK_SM_3,
            Block::Ctl => NPU2_BLOCK_CTL,
            Block::Dat => NPU2_BLOCK_DAT,
            Block::Otl0 => NPU2_BLOCK_OTL0,
            Block::Otl1 => NPU2_BLOCK_OTL1,
            Block::Xsl => NPU2_BLOCK_XSL,
            Block::Misc => NPU2_BLOCK_MISC,
            Block::Xts => NPU2_BLOCK_XTS,
        }
    }
}

/// Which of the two ODLs of an OBUS drives a brick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Odl {
    Odl0,
    Odl1,
}

impl TryFrom<u32> for BrickIndex {
    type Error = OcapiError;

    fn try_from(index: u32) -> Result<Self, Self::Error> {
        match index {
            2 => Ok(BrickIndex::Brick2),
            3 => Ok(BrickIndex::Brick3),
            4 => Ok(BrickIndex::Brick4),
            5 => Ok(BrickIndex::Brick5),
            _ => Err(OcapiError::InvalidParameter),
        }
    }
}

impl BrickIndex {
    pub const ALL: [BrickIndex; 4] = [
        BrickIndex::Brick2,
        BrickIndex::Brick3,
        BrickIndex::Brick4,
        BrickIndex::Brick5,
    ];

    pub const fn value(self) -> u32 {
        self as u32
    }

    /// Brick id programmed into OTL_CONFIG0.
    pub const fn brick_id(self) -> u64 {
        self as u64 - 2
    }

    pub const fn stack(self) -> Stack {
        match self {
            BrickIndex::Brick2 | BrickIndex::Brick3 => Stack::Stck1,
            BrickIndex::Brick4 | BrickIndex::Brick5 => Stack::Stck2,
        }
    }

    pub const fn stack_upper(self) -> Stack {
        match self {
            BrickIndex::Brick2 | BrickIndex::Brick3 => Stack::Stck1U,
            BrickIndex::Brick4 | BrickIndex::Brick5 => Stack::Stck2U,
        }
    }

    /// Stack number relative to stack 0, used to pick the GENID window.
    pub const fn stack_num(self) -> u32 {
        (self.stack().value() - NPU2_STACK_STCK_0) as u32
    }

    pub const fn block(self) -> Block {
        match self {
            BrickIndex::Brick2 | BrickIndex::Brick4 => Block::Otl0,
            BrickIndex::Brick3 | BrickIndex::Brick5 => Block::Otl1,
        }
    }

    pub const fn is_otl1(self) -> bool {
        matches!(self.block(), Block::Otl1)
    }

    /// ODL cabled to the brick. OBUS 3 is crossed: OTL0 goes to ODL1.
    pub const fn odl(self) -> Odl {
        match self {
            BrickIndex::Brick2 | BrickIndex::Brick5 => Odl::Odl0,
            BrickIndex::Brick3 | BrickIndex::Brick4 => Odl::Odl1,
        }
    }

    pub const fn odl_status_reg(self) -> u64 {
        match self {
            BrickIndex::Brick2 => OB0_ODL0_STATUS,
            BrickIndex::Brick3 => OB0_ODL1_STATUS,
            BrickIndex::Brick4 => OB3_ODL1_STATUS,
            BrickIndex::Brick5 => OB3_ODL0_STATUS,
        }
    }

    pub const fn odl_config_reg(self) -> u64 {
        match self {
            BrickIndex::Brick2 => OB0_ODL0_CONFIG,
            BrickIndex::Brick3 => OB0_ODL1_CONFIG,
            BrickIndex::Brick4 => OB3_ODL1_CONFIG,
            BrickIndex::Brick5 => OB3_ODL0_CONFIG,
        }
    }

    pub const fn obus_phy_config_reg(self) -> u64 {
        match self {
            BrickIndex::Brick2 | BrickIndex::Brick3 => OBUS_LL0_IOOL_PHY_CONFIG,
            BrickIndex::Brick4 | BrickIndex::Brick5 => OBUS_LL3_IOOL_PHY_CONFIG,
        }
    }

    /// I2C data for the device reset sequence.
    ///
    /// Selected by OTL side, not by ODL: bricks 2 and 4 use the ODL0 table.
    pub fn reset_data(self, ocapi: &PlatformOcapi) -> [u8; 3] {
        match self {
            BrickIndex::Brick2 | BrickIndex::Brick4 => ocapi.i2c_odl0_data,
            BrickIndex::Brick3 | BrickIndex::Brick5 => ocapi.i2c_odl1_data,
        }
    }

    /// Translation-fault interrupt of the brick.
    pub const fn xsl_irq(self, irq_base: u32) -> u32 {
        let mut irq = irq_base + crate::config::NPU_IRQ_LEVELS_XSL;
        if matches!(self.stack_upper(), Stack::Stck2U) {
            irq += 2;
        }
        if self.is_otl1() {
            irq += 1;
        }
        irq
    }

    /// Offset of the brick's config-space back-door within its GENID window.
    pub const fn genid_offset(self) -> u64 {
        if self.is_otl1() { 256 } else { 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_nvlink_and_out_of_range() {
        for i in [0, 1, 6, 7, 100] {
            assert_eq!(BrickIndex::try_from(i), Err(OcapiError::InvalidParameter));
        }
        assert_eq!(BrickIndex::try_from(4), Ok(BrickIndex::Brick4));
    }

    #[test]
    fn stack_and_block_table() {
        use BrickIndex::*;
        let expect = [
            (Brick2, Stack::Stck1, Stack::Stck1U, Block::Otl0),
            (Brick3, Stack::Stck1, Stack::Stck1U, Block::Otl1),
            (Brick4, Stack::Stck2, Stack::Stck2U, Block::Otl0),
            (Brick5, Stack::Stck2, Stack::Stck2U, Block::Otl1),
        ];
        for (b, s, su, blk) in expect {
            assert_eq!(b.stack(), s);
            assert_eq!(b.stack_upper(), su);
            assert_eq!(b.block(), blk);
        }
        assert_eq!(Brick2.stack_num(), 1);
        assert_eq!(Brick5.stack_num(), 2);
    }

    #[test]
    fn odl_wiring() {
        use BrickIndex::*;
        assert_eq!(Brick2.odl_status_reg(), OB0_ODL0_STATUS);
        assert_eq!(Brick3.odl_status_reg(), OB0_ODL1_STATUS);
        assert_eq!(Brick4.odl_status_reg(), OB3_ODL1_STATUS);
        assert_eq!(Brick5.odl_status_reg(), OB3_ODL0_STATUS);
        assert_eq!(Brick4.odl_config_reg(), OB3_ODL1_CONFIG);
        assert_eq!(Brick5.odl(), Odl::Odl0);
        assert_eq!(Brick3.obus_phy_config_reg(), OBUS_LL0_IOOL_PHY_CONFIG);
        assert_eq!(Brick4.obus_phy_config_reg(), OBUS_LL3_IOOL_PHY_CONFIG);
    }

    #[test]
    fn xsl_irq_numbers() {
        let irqs: [u32; 4] = BrickIndex::ALL.map(|b| b.xsl_irq(0x100));
        assert_eq!(irqs, [0x100 + 23, 0x100 + 24, 0x100 + 25, 0x100 + 26]);
    }
}
