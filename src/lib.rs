//! OpenCAPI link bring-up and runtime control for the POWER9 NPU.
//!
//! At boot, [`Npu2Ocapi::probe`] walks the device tree for NPUs wired for
//! OpenCAPI, runs the register bring-up of every brick, trains the links and
//! publishes one PHB per brick. At run time the OS drives the links through
//! the calls in [`opal`], serialized per NPU by the locks in [`lock`].
//!
//! Platform services (XSCOM, MMIO, timers, I2C, XIVE, NVRAM, PHY procedures)
//! are reached through the [`Osal`] trait.

#![cfg_attr(not(test), no_std)]

extern crate alloc;
#[macro_use]
extern crate log;

pub mod brick;
mod config;
pub mod device;
pub mod dt;
mod err;
pub mod hal;
pub mod lock;
pub mod opal;
mod osal;
pub mod phb;
pub mod registers;
pub mod train;

use alloc::format;
use alloc::vec::Vec;

pub use brick::BrickIndex;
pub use config::*;
pub use device::{LinkStatus, Npu2, OcapiDevice};
pub use err::*;
pub use opal::OpalCall;
pub use osal::*;
pub use phb::{OcapiPhb, PeMapping, PhbOps, SlotOps};
pub use registers::{Mmio, RawMmio, ScomBus};

use crate::dt::{DeviceTree, NodeId, hi32, lo32};
use crate::hal::{FenceState, HardwareLayer};
use crate::phb::PhbType;

/// A PHB to register once its NPU is in place.
struct PendingPhb {
    dev: usize,
    with_slot: bool,
}

/// OpenCAPI driver state: every NPU brought up and every PHB published.
pub struct Npu2Ocapi<O: Osal> {
    osal: O,
    training: TrainingMode,
    npus: Vec<Npu2>,
    phbs: Vec<OcapiPhb<O>>,
}

impl<O: Osal> Npu2Ocapi<O> {
    pub fn new(osal: O) -> Self {
        let training =
            TrainingMode::from_nvram(osal.nvram_query(NVRAM_TRAINING_KEY).as_deref());
        Self {
            osal,
            training,
            npus: Vec::new(),
            phbs: Vec::new(),
        }
    }

    /// Brings up every OpenCAPI NPU described in `dt`.
    pub fn probe(osal: O, dt: &mut DeviceTree) -> Self {
        let mut this = Self::new(osal);
        for node in dt.find_compatible(dt.root(), "ibm,power9-npu") {
            this.probe_npu(dt, node);
        }
        this
    }

    pub fn osal(&self) -> &O {
        &self.osal
    }

    pub fn training_mode(&self) -> TrainingMode {
        self.training
    }

    pub fn npus(&self) -> &[Npu2] {
        &self.npus
    }

    pub fn phbs(&self) -> &[OcapiPhb<O>] {
        &self.phbs
    }

    fn probe_npu(&mut self, dt: &mut DeviceTree, node: NodeId) {
        let Some((npu, pending)) = self.bring_up_npu(dt, node) else {
            return;
        };
        let npu_slot = self.npus.len();
        for p in &pending {
            self.register_phb(dt, npu_slot, &npu, p);
        }
        self.npus.push(npu);
    }

    fn bring_up_npu(&self, dt: &mut DeviceTree, node: NodeId) -> Option<(Npu2, Vec<PendingPhb>)> {
        let npu_index = dt.prop_u32(node, "ibm,npu-index").unwrap_or(0);

        // NVLink and OpenCAPI don't mix on one NPU
        if !dt.find_compatible(node, "ibm,npu-link").is_empty() {
            debug!("OCAPI: NPU{}: NVLink links present, skipping", npu_index);
            return None;
        }

        let Some(chip_id) = dt.chip_id(node) else {
            error!("OCAPI: NPU{}: no chip id", npu_index);
            return None;
        };
        let Some(xscom_base) = dt.address(node) else {
            error!("OCAPI: NPU{}: no SCOM base", npu_index);
            return None;
        };
        let links = dt.prop_u32(node, "ibm,npu-links").unwrap_or(0);

        info!(
            "OCAPI: Chip {} Found OpenCAPI NPU{} ({} links) at {}",
            chip_id,
            npu_index,
            links,
            dt.path(node)
        );
        info!("OCAPI:   SCOM Base:  {:08x}", xscom_base);

        // The bring-up procedures cannot be replayed after a fast reboot
        self.osal.disable_fast_reboot("OpenCAPI device enabled");

        let hal = HardwareLayer::new(&self.osal, chip_id, xscom_base);
        let (regs, _) = match hal.setup_global_mmio_bar() {
            Ok(win) => win,
            Err(e) => {
                error!("OCAPI: NPU{}: global MMIO BAR setup failed: {}", npu_index, e);
                return None;
            }
        };
        let mut npu = Npu2::new(chip_id, npu_index, xscom_base, regs, node);

        let link_nodes = dt.find_compatible(node, "ibm,npu-link-opencapi");
        let configured: Vec<(NodeId, Result<BrickIndex, OcapiError>)> = link_nodes
            .iter()
            .map(|&link| {
                let raw = dt.prop_u32(link, "ibm,npu-link-index").unwrap_or(u32::MAX);
                info!("OCAPI: Configuring link index {}", raw);
                let res = BrickIndex::try_from(raw).and_then(|index| {
                    hal.brick_config(index)?;
                    hal.tl_config(index)?;
                    hal.address_translation_config(index)?;
                    Ok(index)
                });
                if let Err(e) = &res {
                    error!("OCAPI: Link {}: configuration failed: {}", raw, e);
                }
                (link, res)
            })
            .collect();

        if hal.setup_irq(&mut npu).is_err() {
            return None;
        }

        let pending = configured
            .into_iter()
            .filter_map(|(link, res)| self.setup_device(dt, &hal, &mut npu, link, res))
            .collect();
        Some((npu, pending))
    }

    /// Publishes the PHB node of a brick, then trains it. Returns the PHB to
    /// register, if any.
    fn setup_device(
        &self,
        dt: &mut DeviceTree,
        hal: &HardwareLayer<'_, O>,
        npu: &mut Npu2,
        link: NodeId,
        configured: Result<BrickIndex, OcapiError>,
    ) -> Option<PendingPhb> {
        let raw_index = dt.prop_u32(link, "ibm,npu-link-index").unwrap_or(u32::MAX);
        let Ok(index) = BrickIndex::try_from(raw_index) else {
            error!("OCAPI: Link index {} is not an OpenCAPI brick", raw_index);
            return None;
        };

        let (mm_base, mm_size) =
            match self
                .osal
                .phys_map_get(npu.chip_id, PhysMapKind::NpuOcapiMmio, index.value())
            {
                Ok(win) => win,
                Err(e) => {
                    error!("OCAPI: Link {}: no MMIO window: {:?}", index.value(), e);
                    return None;
                }
            };
        debug!(
            "OCAPI: Setting MMIO window to {:016x} + {:016x}",
            mm_base, mm_size
        );
        let phb_node = self.add_phb_node(dt, npu, mm_base, mm_size);
        npu.mm_base = mm_base;
        npu.mm_size = mm_size;

        let mut dev = OcapiDevice::new(index, link);
        dev.phb_node = Some(phb_node);
        dev.pl_xscom_base = dt.prop_u64(link, "ibm,npu-phy").unwrap_or(0);
        dev.lane_mask = dt.prop_u32(link, "ibm,npu-lane-mask").unwrap_or(0);
        dev.link_speed = dt.prop_u64(link, "ibm,link-speed").unwrap_or(0);
        npu.total_devices += 1;

        let outcome = match configured {
            Ok(_) => self.bring_up_device(dt, hal, &mut dev),
            Err(e) => {
                dev.status = LinkStatus::ConfigFailed;
                Err(e)
            }
        };

        let dev_slot = npu.devices.len();
        npu.devices.push(dev);
        match outcome {
            Ok(with_slot) => Some(PendingPhb {
                dev: dev_slot,
                with_slot,
            }),
            Err(_) => {
                dt.add_property_string(phb_node, "status", "error");
                None
            }
        }
    }

    fn add_phb_node(&self, dt: &mut DeviceTree, npu: &Npu2, mm_base: u64, mm_size: u64) -> NodeId {
        let window = [hi32(mm_base), lo32(mm_base), hi32(mm_size), lo32(mm_size)];
        let npcq = dt.phandle(npu.dt_node);
        let phb = dt.new_addr(dt.root(), "pciex", mm_base);
        dt.add_property_strings(
            phb,
            "compatible",
            &["ibm,power9-npu-opencapi-pciex", "ibm,ioda2-npu2-opencapi-phb"],
        );
        dt.add_property_cells(phb, "#address-cells", &[3]);
        dt.add_property_cells(phb, "#size-cells", &[2]);
        dt.add_property_cells(phb, "#interrupt-cells", &[1]);
        if let Some(ics) = self.osal.ics_phandle() {
            dt.add_property_cells(phb, "interrupt-parent", &[ics]);
        }
        dt.add_property_cells(phb, "bus-range", &[0, 0xff]);
        dt.add_property_cells(phb, "clock-frequency", &[0x200, 0]);
        dt.add_property_string(phb, "device_type", "pciex");
        dt.add_property_cells(phb, "reg", &window);
        dt.add_property_cells(phb, "ibm,npu-index", &[npu.npu_index]);
        dt.add_property_cells(phb, "ibm,chip-id", &[npu.chip_id]);
        dt.add_property_cells(phb, "ibm,xscom-base", &[npu.xscom_base as u32]);
        dt.add_property_cells(phb, "ibm,npcq", &[npcq]);
        dt.add_property_cells(phb, "ibm,links", &[1]);
        dt.add_property_cells(phb, "ibm,mmio-window", &window);
        dt.add_property_cells(phb, "ibm,phb-diag-data-size", &[0]);
        dt.add_property_cells(phb, "ibm,opal-num-pes", &[MAX_PE_NUM as u32]);
        dt.add_property_cells(
            phb,
            "ranges",
            &[
                0x0200_0000,
                hi32(mm_base),
                lo32(mm_base),
                hi32(mm_base),
                lo32(mm_base),
                hi32(mm_size),
                lo32(mm_size),
            ],
        );
        phb
    }

    /// I2C lookup, AFU BARs, fence reset, PHY setup and training. Returns
    /// whether the PHB gets a slot.
    fn bring_up_device(
        &self,
        dt: &DeviceTree,
        hal: &HardwareLayer<'_, O>,
        dev: &mut OcapiDevice,
    ) -> Result<bool, OcapiError> {
        let index = dev.index;
        let chip_id = hal.chip_id();
        let ocapi = self.osal.ocapi();
        let port_name = format!(
            "p8_{:08x}_e{}p{}",
            chip_id, ocapi.i2c_engine, ocapi.i2c_port
        );
        debug!("OCAPI: Looking for I2C port {}", port_name);
        dev.i2c_port_id = dt
            .find_compatible(dt.root(), "ibm,power9-i2c-port")
            .into_iter()
            .find(|&n| dt.prop_str(n, "ibm,port-name") == Some(port_name.as_str()))
            .and_then(|n| dt.prop_u32(n, "ibm,opal-id"))
            .filter(|&id| id != 0);
        if dev.i2c_port_id.is_none() {
            error!("OCAPI: Couldn't find I2C port {}", port_name);
            dev.status = LinkStatus::ConfigFailed;
            return Err(OcapiError::InvalidParameter);
        }

        let prepared = hal
            .setup_afu_mmio_bars(dev)
            .and_then(|_| hal.setup_afu_config_bars(dev))
            .and_then(|_| hal.set_fence_control(index, FenceState::Unfenced))
            .and_then(|_| Ok(self.osal.phy_setup(&dev.phy_target(chip_id))?));
        if let Err(e) = prepared {
            error!("OCAPI: Link {}: device setup failed: {}", index.value(), e);
            dev.status = LinkStatus::ConfigFailed;
            return Err(e);
        }

        match self.training {
            TrainingMode::Prbs31 => {
                info!(
                    "OCAPI: Link {} sending PRBS31 pattern per NVRAM setting",
                    index.value()
                );
                self.osal.phy_prbs31(&dev.phy_target(chip_id));
                dev.status = LinkStatus::Untrained;
                Ok(false)
            }
            TrainingMode::None => {
                info!("OCAPI: Link {} not trained per NVRAM setting", index.value());
                dev.status = LinkStatus::Untrained;
                Ok(false)
            }
            TrainingMode::Default => {
                if let Err(e) = hal.train_link(dev) {
                    dev.status = LinkStatus::TrainingFailed;
                    return Err(e);
                }
                hal.otl_enable_tx(index)?;
                dev.status = LinkStatus::Trained;
                Ok(true)
            }
        }
    }

    fn register_phb(&mut self, dt: &mut DeviceTree, npu_slot: usize, npu: &Npu2, p: &PendingPhb) {
        let Some(phb_node) = npu.devices[p.dev].phb_node else {
            return;
        };
        let opal_id = self.phbs.len() as u64;
        dt.add_property_u64(phb_node, "ibm,opal-phbid", opal_id);
        debug!(
            "OCAPI: Registered PHB {} for link {}",
            opal_id,
            npu.devices[p.dev].index.value()
        );
        self.phbs.push(OcapiPhb {
            opal_id,
            phb_type: PhbType::Npu2Opencapi,
            dt_node: phb_node,
            scan_map: 1,
            ops: PhbOps::opencapi(),
            slot: p.with_slot.then(SlotOps::opencapi),
            npu: npu_slot,
            dev: p.dev,
        });
    }
}
