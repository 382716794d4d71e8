//! Simulated POWER9 chip for host-side tests.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use npu2_ocapi::brick::{Block, BrickIndex, Stack};
use npu2_ocapi::dt::{DeviceTree, NodeId};
use npu2_ocapi::lock::{LockContext, LockPlatform};
use npu2_ocapi::registers::consts::*;
use npu2_ocapi::registers::reg_offset;
use npu2_ocapi::{
    Mmio, Npu2Ocapi, OcapiPlatformType, Osal, OsalError, PhyTarget, PhysAddr, PhysMapKind,
    PlatformOcapi, ScomBus, TimeStamp,
};

pub const CHIP_ID: u32 = 0;
pub const NPU_SCOM_BASE: u64 = 0x501_1000;
pub const I2C_OPAL_ID: u32 = 3;

pub const NPU_REGS_BASE: u64 = 0x6_0300_0000_0000;
pub const NPU_REGS_SIZE: u64 = 0x100_0000;
pub const PHY_BASE: u64 = 0x6_0302_0000_0000;
pub const PHY_SIZE: u64 = 0x20_0000;
pub const GENID_BASE: u64 = 0x6_0304_0000_0000;
pub const GENID_SIZE: u64 = 0x20_0000;
pub const OCAPI_MMIO_BASE: u64 = 0x6_0100_0000_0000;
pub const OCAPI_MMIO_SIZE: u64 = 0x20_0000_0000;

pub const IRQ_TRIGGER_BASE: u64 = 0x6_0060_0000_0000;

/// Fabric access seen by the simulated chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    XscomRead(u64),
    XscomWrite(u64, u64),
    NpuRead(u64),
    NpuWrite(u64, u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I2cWrite {
    pub port_id: u32,
    pub dev_addr: u8,
    pub offset: u32,
    pub offset_bytes: u8,
    pub data: Vec<u8>,
    pub timeout_ms: u32,
    pub at_us: u64,
}

pub fn genid_window(stack_num: u32) -> u64 {
    GENID_BASE + stack_num as u64 * GENID_SIZE
}

pub fn ocapi_mmio_window(index: u32) -> u64 {
    OCAPI_MMIO_BASE + index as u64 * OCAPI_MMIO_SIZE
}

pub struct SimPlatform {
    ocapi: PlatformOcapi,
    time_us: Cell<u64>,
    xscom: RefCell<HashMap<u64, u64>>,
    npu_regs: RefCell<HashMap<u64, u64>>,
    ind_addr: Cell<u64>,
    log: RefCell<Vec<Access>>,

    pub fence_stuck: Cell<bool>,
    pub llcmd_sticky: Cell<bool>,
    pub xscom_fail: Cell<bool>,
    /// Training attempt on which each ODL reports trained, keyed by ODL
    /// config register. Missing means first attempt.
    trains_on_attempt: RefCell<HashMap<u64, u32>>,
    train_attempts: RefCell<HashMap<u64, u32>>,
    pub trained_mode: Cell<u64>,

    mem: RefCell<HashMap<u64, u8>>,
    cfg_latch: RefCell<HashMap<u64, u64>>,
    cfg_space: RefCell<HashMap<(u64, u64, u64), u32>>,
    mmio_log: RefCell<Vec<(u64, u64)>>,

    i2c: RefCell<Vec<I2cWrite>>,
    pub i2c_fail: Cell<bool>,

    next_irq: Cell<u32>,
    pub xive_exhausted: Cell<bool>,
    pub ipi_sources: RefCell<Vec<(u32, u32)>>,
    pub ics_phandle: Cell<Option<u32>>,

    pub ec_level: Cell<Option<u8>>,
    nvram: RefCell<HashMap<String, String>>,
    pub fast_reboot_disabled: RefCell<Vec<String>>,

    pub phy_setups: RefCell<Vec<BrickIndex>>,
    pub phy_bumps: RefCell<Vec<BrickIndex>>,
    pub phy_prbs31: RefCell<Vec<BrickIndex>>,
}

impl Default for SimPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl SimPlatform {
    pub fn new() -> Self {
        Self {
            ocapi: PlatformOcapi::new(OcapiPlatformType::Zaius),
            time_us: Cell::new(0),
            xscom: RefCell::new(HashMap::new()),
            npu_regs: RefCell::new(HashMap::new()),
            ind_addr: Cell::new(0),
            log: RefCell::new(Vec::new()),
            fence_stuck: Cell::new(false),
            llcmd_sticky: Cell::new(false),
            xscom_fail: Cell::new(false),
            trains_on_attempt: RefCell::new(HashMap::new()),
            train_attempts: RefCell::new(HashMap::new()),
            trained_mode: Cell::new(0b0010),
            mem: RefCell::new(HashMap::new()),
            cfg_latch: RefCell::new(HashMap::new()),
            cfg_space: RefCell::new(HashMap::new()),
            mmio_log: RefCell::new(Vec::new()),
            i2c: RefCell::new(Vec::new()),
            i2c_fail: Cell::new(false),
            next_irq: Cell::new(0x30),
            xive_exhausted: Cell::new(false),
            ipi_sources: RefCell::new(Vec::new()),
            ics_phandle: Cell::new(None),
            ec_level: Cell::new(Some(0x22)),
            nvram: RefCell::new(HashMap::new()),
            fast_reboot_disabled: RefCell::new(Vec::new()),
            phy_setups: RefCell::new(Vec::new()),
            phy_bumps: RefCell::new(Vec::new()),
            phy_prbs31: RefCell::new(Vec::new()),
        }
    }

    pub fn with_nvram(self, key: &str, value: &str) -> Self {
        self.nvram
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn now_us(&self) -> u64 {
        self.time_us.get()
    }

    /// ODL of `index` reports trained on its `attempt`-th training start.
    /// `u32::MAX` never trains.
    pub fn train_on_attempt(&self, index: BrickIndex, attempt: u32) {
        self.trains_on_attempt
            .borrow_mut()
            .insert(index.odl_config_reg(), attempt);
    }

    pub fn train_attempts(&self, index: BrickIndex) -> u32 {
        self.train_attempts
            .borrow()
            .get(&index.odl_config_reg())
            .copied()
            .unwrap_or(0)
    }

    pub fn log(&self) -> Vec<Access> {
        self.log.borrow().clone()
    }

    pub fn clear_log(&self) {
        self.log.borrow_mut().clear();
    }

    /// NPU-internal writes, in order.
    pub fn npu_writes(&self) -> Vec<(u64, u64)> {
        self.log
            .borrow()
            .iter()
            .filter_map(|a| match *a {
                Access::NpuWrite(r, v) => Some((r, v)),
                _ => None,
            })
            .collect()
    }

    pub fn xscom_writes(&self) -> Vec<(u64, u64)> {
        self.log
            .borrow()
            .iter()
            .filter_map(|a| match *a {
                Access::XscomWrite(r, v) => Some((r, v)),
                _ => None,
            })
            .collect()
    }

    pub fn npu_reg(&self, reg: u64) -> u64 {
        self.npu_regs.borrow().get(&reg).copied().unwrap_or(0)
    }

    pub fn set_npu_reg(&self, reg: u64, val: u64) {
        self.npu_regs.borrow_mut().insert(reg, val);
    }

    pub fn xscom_reg(&self, addr: u64) -> u64 {
        self.xscom.borrow().get(&addr).copied().unwrap_or(0)
    }

    pub fn set_xscom_reg(&self, addr: u64, val: u64) {
        self.xscom.borrow_mut().insert(addr, val);
    }

    pub fn i2c_writes(&self) -> Vec<I2cWrite> {
        self.i2c.borrow().clone()
    }

    /// Plain memory, for OS-provided buffers.
    pub fn poke(&self, addr: u64, bytes: &[u8]) {
        let mut mem = self.mem.borrow_mut();
        for (i, b) in bytes.iter().enumerate() {
            mem.insert(addr + i as u64, *b);
        }
    }

    /// Config-space dword of the device behind a GENID back-door.
    pub fn set_cfg_dword(&self, window: u64, bdfn: u64, offset: u64, val: u32) {
        self.cfg_space
            .borrow_mut()
            .insert((window, bdfn, offset & !3), val);
    }

    pub fn cfg_dword(&self, window: u64, bdfn: u64, offset: u64) -> u32 {
        self.cfg_space
            .borrow()
            .get(&(window, bdfn, offset & !3))
            .copied()
            .unwrap_or(0)
    }

    /// Config-address words latched through `out_be64`, with their window.
    pub fn cfg_addr_writes(&self) -> Vec<(u64, u64)> {
        self.mmio_log.borrow().clone()
    }

    fn genid_windows() -> [u64; 4] {
        [
            genid_window(1),
            genid_window(1) + 256,
            genid_window(2),
            genid_window(2) + 256,
        ]
    }

    /// Splits a data-window address into (window, byte in dword).
    fn cfg_target(addr: u64) -> Option<(u64, u64)> {
        Self::genid_windows().into_iter().find_map(|w| {
            let data = w + 128;
            (addr >= data && addr < data + 4).then(|| (w, addr - data))
        })
    }

    fn cfg_dword_at(&self, window: u64) -> Option<(u64, u64)> {
        let latch = *self.cfg_latch.borrow().get(&window)?;
        if latch >> 63 == 0 {
            return None;
        }
        let bdfn = (latch >> 44) & 0xffff;
        let reg = (latch >> 32) & 0xfff;
        Some((bdfn, reg))
    }

    fn cfg_read(&self, addr: u64, width: u64) -> Option<u64> {
        let (window, byte) = Self::cfg_target(addr)?;
        let (bdfn, reg) = self.cfg_dword_at(window)?;
        let dword = self.cfg_dword(window, bdfn, reg) as u64;
        let mask = (1u64 << (width * 8)) - 1;
        Some((dword >> (byte * 8)) & mask)
    }

    fn cfg_write(&self, addr: u64, width: u64, val: u64) -> bool {
        let Some((window, byte)) = Self::cfg_target(addr) else {
            return false;
        };
        let Some((bdfn, reg)) = self.cfg_dword_at(window) else {
            return true;
        };
        let mask = ((1u64 << (width * 8)) - 1) << (byte * 8);
        let old = self.cfg_dword(window, bdfn, reg) as u64;
        let new = (old & !mask) | ((val << (byte * 8)) & mask);
        self.set_cfg_dword(window, bdfn, reg, new as u32);
        true
    }

    fn mem_read(&self, addr: u64, width: u64) -> u64 {
        let mem = self.mem.borrow();
        (0..width).fold(0, |acc, i| {
            acc | (mem.get(&(addr + i)).copied().unwrap_or(0) as u64) << (8 * i)
        })
    }

    fn mem_write(&self, addr: u64, width: u64, val: u64) {
        let mut mem = self.mem.borrow_mut();
        for i in 0..width {
            mem.insert(addr + i, (val >> (8 * i)) as u8);
        }
    }

    fn npu_read(&self, reg: u64) -> u64 {
        self.log.borrow_mut().push(Access::NpuRead(reg));
        self.npu_reg(reg)
    }

    fn npu_write(&self, reg: u64, val: u64) {
        self.log.borrow_mut().push(Access::NpuWrite(reg, val));
        self.set_npu_reg(reg, val);

        for stack in [Stack::Stck1, Stack::Stck2] {
            for (control, shift) in [
                (NPU2_CQ_CTL_FENCE_CONTROL_0, 14),
                (NPU2_CQ_CTL_FENCE_CONTROL_1, 12),
            ] {
                if reg == reg_offset(stack, Block::Ctl, control) && !self.fence_stuck.get() {
                    let status_reg = reg_offset(stack, Block::Ctl, NPU2_CQ_CTL_STATUS);
                    let requested = (val >> 62) & 0b11;
                    let status = self.npu_reg(status_reg) & !(0b11 << shift);
                    self.set_npu_reg(status_reg, status | (requested << shift));
                }
            }
            if reg == reg_offset(stack, Block::Xsl, NPU2_XSL_PSL_LLCMD_A0) && self.llcmd_sticky.get()
            {
                self.set_npu_reg(reg, val | (1 << 47));
            }
        }
    }

    fn odl_status_for(&self, addr: u64) -> Option<u64> {
        let config = match addr {
            OB0_ODL0_STATUS => OB0_ODL0_CONFIG,
            OB0_ODL1_STATUS => OB0_ODL1_CONFIG,
            OB3_ODL0_STATUS => OB3_ODL0_CONFIG,
            OB3_ODL1_STATUS => OB3_ODL1_CONFIG,
            _ => return None,
        };
        let attempts = self.train_attempts.borrow().get(&config).copied().unwrap_or(0);
        let needed = self
            .trains_on_attempt
            .borrow()
            .get(&config)
            .copied()
            .unwrap_or(1);
        if attempts >= needed {
            Some((self.trained_mode.get() << 60) | (0x7 << 12))
        } else {
            Some(0x1 << 12)
        }
    }
}

impl ScomBus for SimPlatform {
    fn xscom_read(&self, _chip_id: u32, addr: u64) -> Result<u64, OsalError> {
        if self.xscom_fail.get() {
            return Err(OsalError::DeviceError);
        }
        if addr == NPU_SCOM_BASE + NPU2_MISC_SCOM_IND_SCOM_DATA {
            return Ok(self.npu_read(self.ind_addr.get()));
        }
        self.log.borrow_mut().push(Access::XscomRead(addr));
        if let Some(status) = self.odl_status_for(addr) {
            return Ok(status);
        }
        Ok(self.xscom_reg(addr))
    }

    fn xscom_write(&self, _chip_id: u32, addr: u64, val: u64) -> Result<(), OsalError> {
        if self.xscom_fail.get() {
            return Err(OsalError::DeviceError);
        }
        if addr == NPU_SCOM_BASE + NPU2_MISC_SCOM_IND_SCOM_ADDR {
            self.ind_addr.set((val >> 40) & 0xff_ffff);
            return Ok(());
        }
        if addr == NPU_SCOM_BASE + NPU2_MISC_SCOM_IND_SCOM_DATA {
            self.npu_write(self.ind_addr.get(), val);
            return Ok(());
        }
        self.log.borrow_mut().push(Access::XscomWrite(addr, val));
        self.set_xscom_reg(addr, val);

        let is_odl_config = matches!(
            addr,
            OB0_ODL0_CONFIG | OB0_ODL1_CONFIG | OB3_ODL0_CONFIG | OB3_ODL1_CONFIG
        );
        if is_odl_config && (val >> 52) & 0xf == 0b1000 {
            *self.train_attempts.borrow_mut().entry(addr).or_insert(0) += 1;
        }
        Ok(())
    }
}

impl Mmio for SimPlatform {
    fn in_8(&self, addr: u64) -> u8 {
        self.cfg_read(addr, 1)
            .unwrap_or_else(|| self.mem_read(addr, 1)) as u8
    }

    fn out_8(&self, addr: u64, val: u8) {
        if !self.cfg_write(addr, 1, val as u64) {
            self.mem_write(addr, 1, val as u64);
        }
    }

    fn in_le16(&self, addr: u64) -> u16 {
        self.cfg_read(addr, 2)
            .unwrap_or_else(|| self.mem_read(addr, 2)) as u16
    }

    fn out_le16(&self, addr: u64, val: u16) {
        if !self.cfg_write(addr, 2, val as u64) {
            self.mem_write(addr, 2, val as u64);
        }
    }

    fn in_le32(&self, addr: u64) -> u32 {
        self.cfg_read(addr, 4)
            .unwrap_or_else(|| self.mem_read(addr, 4)) as u32
    }

    fn out_le32(&self, addr: u64, val: u32) {
        if !self.cfg_write(addr, 4, val as u64) {
            self.mem_write(addr, 4, val as u64);
        }
    }

    fn in_be64(&self, addr: u64) -> u64 {
        self.mem_read(addr, 8).swap_bytes()
    }

    fn out_be64(&self, addr: u64, val: u64) {
        if Self::genid_windows().contains(&addr) {
            self.cfg_latch.borrow_mut().insert(addr, val);
            self.mmio_log.borrow_mut().push((addr, val));
            return;
        }
        self.mem_write(addr, 8, val.swap_bytes());
    }
}

impl Osal for SimPlatform {
    fn get_time_us(&self) -> TimeStamp {
        self.time_us.get()
    }

    fn udelay(&self, us: u32) {
        self.time_us.set(self.time_us.get() + us as u64);
    }

    fn msleep(&self, ms: u32) {
        self.time_us.set(self.time_us.get() + ms as u64 * 1000);
    }

    fn ocapi(&self) -> &PlatformOcapi {
        &self.ocapi
    }

    fn phys_map_get(
        &self,
        _chip_id: u32,
        kind: PhysMapKind,
        index: u32,
    ) -> Result<(PhysAddr, u64), OsalError> {
        match (kind, index) {
            (PhysMapKind::NpuRegs, 0) => Ok((NPU_REGS_BASE, NPU_REGS_SIZE)),
            (PhysMapKind::NpuPhy, 0 | 1) => Ok((PHY_BASE + index as u64 * PHY_SIZE, PHY_SIZE)),
            (PhysMapKind::NpuGenid, 0..=2) => Ok((genid_window(index), GENID_SIZE)),
            (PhysMapKind::NpuOcapiMmio, 2..=5) => Ok((ocapi_mmio_window(index), OCAPI_MMIO_SIZE)),
            _ => Err(OsalError::InvalidParameter),
        }
    }

    fn nimbus_ec_level(&self) -> Option<u8> {
        self.ec_level.get()
    }

    fn xive_alloc_ipi_irqs(&self, _chip_id: u32, count: u32, align: u32) -> Option<u32> {
        if self.xive_exhausted.get() {
            return None;
        }
        let base = self.next_irq.get().next_multiple_of(align);
        self.next_irq.set(base + count);
        Some(base)
    }

    fn xive_register_ipi_source(&self, base: u32, count: u32) {
        self.ipi_sources.borrow_mut().push((base, count));
    }

    fn xive_trigger_port(&self, irq: u32) -> PhysAddr {
        IRQ_TRIGGER_BASE + irq as u64 * 0x2_0000
    }

    fn ics_phandle(&self) -> Option<u32> {
        self.ics_phandle.get()
    }

    fn i2c_smbus_write(
        &self,
        port_id: u32,
        dev_addr: u8,
        offset: u32,
        offset_bytes: u8,
        data: &[u8],
        timeout_ms: u32,
    ) -> Result<(), OsalError> {
        if self.i2c_fail.get() {
            return Err(OsalError::TimeoutError);
        }
        self.i2c.borrow_mut().push(I2cWrite {
            port_id,
            dev_addr,
            offset,
            offset_bytes,
            data: data.to_vec(),
            timeout_ms,
            at_us: self.time_us.get(),
        });
        Ok(())
    }

    fn nvram_query(&self, key: &str) -> Option<String> {
        self.nvram.borrow().get(key).cloned()
    }

    fn disable_fast_reboot(&self, reason: &str) {
        self.fast_reboot_disabled
            .borrow_mut()
            .push(reason.to_string());
    }

    fn phy_setup(&self, phy: &PhyTarget) -> Result<(), OsalError> {
        self.phy_setups.borrow_mut().push(phy.index);
        Ok(())
    }

    fn phy_bump_ui_lane(&self, phy: &PhyTarget) {
        self.phy_bumps.borrow_mut().push(phy.index);
    }

    fn phy_prbs31(&self, phy: &PhyTarget) {
        self.phy_prbs31.borrow_mut().push(phy.index);
    }

    fn opal_addr_valid(&self, addr: PhysAddr) -> bool {
        addr != 0 && addr < (1 << 48)
    }
}

/// Lock hooks backed by the host clock.
pub struct HostLockPlatform {
    start: Instant,
    pub flushes: Arc<AtomicUsize>,
}

impl HostLockPlatform {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            flushes: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl LockPlatform for HostLockPlatform {
    fn timebase_ms(&self) -> Option<u64> {
        Some(self.start.elapsed().as_millis() as u64)
    }

    fn flush_console(&self) {
        self.flushes.fetch_add(1, Ordering::SeqCst);
    }

    fn disable_fast_reboot(&self, _reason: &str) {}
}

pub fn lock_context(max_pir: u32) -> LockContext {
    let ctx = LockContext::new(max_pir, Box::new(HostLockPlatform::new()));
    ctx.init_locks();
    ctx
}

/// Device tree of one chip with an OpenCAPI NPU carrying `links`, plus
/// the I2C port used for device reset.
pub struct Fixture {
    pub dt: DeviceTree,
    pub npu: NodeId,
    pub links: Vec<NodeId>,
}

pub fn zaius_tree(links: &[u32]) -> Fixture {
    let mut dt = DeviceTree::new();
    let root = dt.root();
    let xscom = dt.new_addr(root, "xscom", 0x603f_c000_0000);
    dt.add_property_cells(xscom, "ibm,chip-id", &[CHIP_ID]);

    let npu = dt.new_addr(xscom, "npu", NPU_SCOM_BASE);
    dt.add_property_strings(npu, "compatible", &["ibm,power9-npu"]);
    dt.add_property_cells(npu, "reg", &[NPU_SCOM_BASE as u32, 0x2c]);
    dt.add_property_cells(npu, "ibm,npu-index", &[0]);
    dt.add_property_cells(npu, "ibm,npu-links", &[links.len() as u32]);

    let links = links
        .iter()
        .map(|&index| {
            let link = dt.new_addr(npu, "link", index as u64);
            dt.add_property_strings(link, "compatible", &["ibm,npu-link-opencapi"]);
            dt.add_property_cells(link, "ibm,npu-link-index", &[index]);
            dt.add_property_u64(link, "ibm,npu-phy", 0x8000_0000_0901_0c3f);
            dt.add_property_cells(link, "ibm,npu-lane-mask", &[0xf1e000]);
            dt.add_property_u64(link, "ibm,link-speed", 25_000_000_000);
            link
        })
        .collect();

    let i2cm = dt.new_addr(xscom, "i2cm", 0xa1000);
    let port = dt.new_addr(i2cm, "i2c-bus", 4);
    dt.add_property_strings(port, "compatible", &["ibm,power9-i2c-port"]);
    dt.add_property_string(port, "ibm,port-name", "p8_00000000_e1p4");
    dt.add_property_cells(port, "ibm,opal-id", &[I2C_OPAL_ID]);

    Fixture { dt, npu, links }
}

pub fn probe(sim: SimPlatform, links: &[u32]) -> (Npu2Ocapi<SimPlatform>, Fixture) {
    let mut fx = zaius_tree(links);
    let drv = Npu2Ocapi::probe(sim, &mut fx.dt);
    (drv, fx)
}

/// The `pciex` node published for a brick.
pub fn phb_node(dt: &DeviceTree, index: u32) -> Option<NodeId> {
    let name = format!("pciex@{:x}", ocapi_mmio_window(index));
    dt.children(dt.root())
        .iter()
        .copied()
        .find(|&n| dt.name(n) == name)
}
