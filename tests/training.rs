mod common;

use npu2_ocapi::brick::{Block, BrickIndex, Stack};
use npu2_ocapi::registers::consts::*;
use npu2_ocapi::registers::reg_offset;
use npu2_ocapi::{LinkStatus, NVRAM_TRAINING_KEY, OcapiError, TrainingMode};

use common::*;

const ODL_BASE_CONFIG: u64 = (0b000001 << 56)
    | (0b0010 << 48)
    | (1 << 47)
    | (0b1111 << 40)
    | (1 << 30)
    | (0b0110 << 20);

#[test]
fn odl_is_reset_then_walked_through_pattern_a_to_start() {
    let (drv, _fx) = probe(SimPlatform::new(), &[2]);
    let sim = drv.osal();

    let writes: Vec<u64> = sim
        .xscom_writes()
        .into_iter()
        .filter(|&(r, _)| r == OB0_ODL0_CONFIG)
        .map(|(_, v)| v)
        .collect();
    assert_eq!(
        writes,
        [
            (1 << 63) | ODL_BASE_CONFIG | (0b0110 << 52),
            ODL_BASE_CONFIG | (0b0110 << 52),
            ODL_BASE_CONFIG | (0b0001 << 52),
            ODL_BASE_CONFIG | (0b1000 << 52),
        ]
    );
    assert_eq!(*sim.phy_bumps.borrow(), [BrickIndex::Brick2]);
    assert_eq!(drv.npus()[0].devices[0].status, LinkStatus::Trained);
}

#[test]
fn device_reset_goes_through_the_expander() {
    let (drv, _fx) = probe(SimPlatform::new(), &[2, 3]);
    let writes = drv.osal().i2c_writes();
    assert_eq!(writes.len(), 6);

    for w in &writes {
        assert_eq!(w.port_id, I2C_OPAL_ID);
        assert_eq!(w.dev_addr, 0x20);
        assert_eq!(w.offset_bytes, 1);
        assert_eq!(w.timeout_ms, 120);
    }
    let seq: Vec<(u32, u8)> = writes.iter().map(|w| (w.offset, w.data[0])).collect();
    assert_eq!(
        seq,
        [
            (0x3, 0xfd),
            (0x1, 0xfd),
            (0x1, 0xff),
            (0x3, 0xbf),
            (0x1, 0xbf),
            (0x1, 0xff),
        ]
    );
    // reset is held for 5ms before release
    assert_eq!(writes[2].at_us - writes[1].at_us, 5_000);
}

#[test]
fn obus3_bricks_use_the_crossed_odls() {
    let sim = SimPlatform::new();
    sim.train_on_attempt(BrickIndex::Brick4, 2);
    let (drv, _fx) = probe(sim, &[4, 5]);
    let sim = drv.osal();

    assert_eq!(sim.train_attempts(BrickIndex::Brick4), 2);
    assert_eq!(sim.train_attempts(BrickIndex::Brick5), 1);
    assert!(
        sim.xscom_writes()
            .iter()
            .any(|&(r, _)| r == OB3_ODL1_CONFIG)
    );
    // reset data follows the OTL, not the ODL
    let data: Vec<u8> = sim.i2c_writes().iter().map(|w| w.data[0]).collect();
    assert_eq!(&data[..3], [0xfd, 0xfd, 0xff]);
    assert_eq!(&data[data.len() - 3..], [0xbf, 0xbf, 0xff]);
}

#[test]
fn training_retries_until_the_link_comes_up() {
    let sim = SimPlatform::new();
    sim.train_on_attempt(BrickIndex::Brick2, 3);
    let (drv, _fx) = probe(sim, &[2]);
    let sim = drv.osal();

    assert_eq!(sim.train_attempts(BrickIndex::Brick2), 3);
    assert_eq!(drv.npus()[0].devices[0].status, LinkStatus::Trained);
    assert_eq!(drv.phbs().len(), 1);
    // two full timeouts before the third attempt
    assert!(sim.now_us() >= 2 * 3_000_000);
    assert_eq!(sim.phy_bumps.borrow().len(), 3);
}

#[test]
fn link_that_never_trains_is_marked_failed() {
    let sim = SimPlatform::new();
    sim.train_on_attempt(BrickIndex::Brick3, u32::MAX);
    let (drv, fx) = probe(sim, &[2, 3]);
    let sim = drv.osal();

    assert_eq!(sim.train_attempts(BrickIndex::Brick3), 5);
    // every attempt ran to its 3s deadline
    assert!(sim.now_us() >= 5 * 3_000_000);
    let devs = &drv.npus()[0].devices;
    assert_eq!(devs[0].status, LinkStatus::Trained);
    assert_eq!(devs[1].status, LinkStatus::TrainingFailed);

    assert_eq!(drv.phbs().len(), 1);
    assert_eq!(drv.phbs()[0].dt_node, phb_node(&fx.dt, 2).unwrap());
    let failed = phb_node(&fx.dt, 3).unwrap();
    assert_eq!(fx.dt.prop_str(failed, "status"), Some("error"));
    assert_eq!(fx.dt.prop_u64(failed, "ibm,opal-phbid"), None);

    // transmit never enabled on the dead link
    assert_eq!(
        sim.npu_reg(reg_offset(Stack::Stck1, Block::Otl1, NPU2_OTL_CONFIG2)),
        0
    );
}

#[test]
fn i2c_failure_aborts_every_attempt() {
    let sim = SimPlatform::new();
    sim.i2c_fail.set(true);
    let (drv, _fx) = probe(sim, &[2]);
    let sim = drv.osal();

    // never got as far as starting training
    assert_eq!(sim.train_attempts(BrickIndex::Brick2), 0);
    assert!(sim.phy_bumps.borrow().is_empty());
    assert_eq!(drv.npus()[0].devices[0].status, LinkStatus::TrainingFailed);
    assert!(drv.phbs().is_empty());
}

#[test]
fn nvram_none_skips_training_but_keeps_the_phb() {
    let sim = SimPlatform::new().with_nvram(NVRAM_TRAINING_KEY, "none");
    let (drv, _fx) = probe(sim, &[2]);
    let sim = drv.osal();

    assert_eq!(drv.training_mode(), TrainingMode::None);
    assert_eq!(drv.npus()[0].devices[0].status, LinkStatus::Untrained);
    assert_eq!(*sim.phy_setups.borrow(), [BrickIndex::Brick2]);
    assert!(sim.i2c_writes().is_empty());
    assert_eq!(sim.train_attempts(BrickIndex::Brick2), 0);

    assert_eq!(drv.phbs().len(), 1);
    assert!(drv.phbs()[0].slot.is_none());
    assert_eq!(drv.slot_link_state(0), Err(OcapiError::Unsupported));
}

#[test]
fn nvram_prbs31_sends_the_pattern_instead() {
    let sim = SimPlatform::new().with_nvram(NVRAM_TRAINING_KEY, "prbs31");
    let (drv, _fx) = probe(sim, &[5]);
    let sim = drv.osal();

    assert_eq!(drv.training_mode(), TrainingMode::Prbs31);
    assert_eq!(*sim.phy_prbs31.borrow(), [BrickIndex::Brick5]);
    assert_eq!(sim.train_attempts(BrickIndex::Brick5), 0);
    assert_eq!(drv.phbs().len(), 1);
    assert!(drv.phbs()[0].slot.is_none());
}

#[test]
fn unknown_nvram_value_trains_normally() {
    let sim = SimPlatform::new().with_nvram(NVRAM_TRAINING_KEY, "bogus");
    let (drv, _fx) = probe(sim, &[2]);
    assert_eq!(drv.training_mode(), TrainingMode::Default);
    assert_eq!(drv.npus()[0].devices[0].status, LinkStatus::Trained);
}

#[test]
fn slot_reports_trained_width() {
    let (drv, _fx) = probe(SimPlatform::new(), &[2]);
    assert_eq!(drv.slot_link_state(0), Ok(8));

    drv.osal().trained_mode.set(0b0001);
    assert_eq!(drv.slot_link_state(0), Ok(4));

    drv.osal().trained_mode.set(0b0100);
    assert_eq!(drv.slot_link_state(0), Err(OcapiError::Hardware));

    assert_eq!(drv.slot_link_state(7), Err(OcapiError::InvalidParameter));
}
