//! C8 — application controller: the top-level object. Owns the device table
//! (keyed by IEEE, with a secondary NWK index), demuxes inbound packets,
//! drives the join/rejoin state machine, and wires the concurrency gate and
//! TSN allocator every device shares through [`RadioHandle`].
//!
//! No surviving `zigpy/application.py` exists in the reference material this
//! crate was built from; this module follows spec.md §2/§4.3/§4.5/§7 directly,
//! structured as a device-table-owning, event-broadcasting, radio-driving
//! top-level object.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as SyncMutex};
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::backup::{BackupManager, NetworkBackup};
use crate::device::Device;
use crate::error::{Result, ZigbeeError};
use crate::group::Groups;
use crate::listener::{DynamicBoundedSemaphore, Requests};
use crate::ota::{OtaImageIndex, OtaManager};
use crate::persistence::{PersistenceBus, PersistenceEvent};
use crate::radio::{AddrModeAddress, IncomingPacket, RadioDriver, RadioEvent, RadioHandle, TxOptions, ZigbeePacket};
use crate::state::{NodeInfo, State};
use crate::topology::{TopologyConfig, TopologyScanner};
use crate::types::{Eui64, LvList, Nwk, Wire};
use crate::zdo::{handle_match_desc, DeviceAnnounce, MatchDescRequest, ZdoCommandId, ZdoStatus};

/// Tunable constants spec.md §4.5/§5 names as config (`max_concurrent_requests`,
/// APS timeouts, topology/backup/OTA intervals). Durations are stored as whole
/// seconds rather than `std::time::Duration` directly, converted to a
/// `Duration` at the call site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    pub max_concurrent_requests: i64,
    pub aps_reply_timeout_secs: u64,
    pub aps_reply_timeout_extended_secs: u64,
    pub topo_scan_period_secs: u64,
    pub topo_skip_coordinator: bool,
    pub backup_period_secs: u64,
    pub ota_max_time_without_progress_secs: u64,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 16,
            aps_reply_timeout_secs: 5,
            aps_reply_timeout_extended_secs: 28,
            topo_scan_period_secs: 3600,
            topo_skip_coordinator: true,
            backup_period_secs: 86_400,
            ota_max_time_without_progress_secs: 60,
        }
    }
}

impl ApplicationConfig {
    pub fn aps_reply_timeout(&self) -> Duration {
        Duration::from_secs(self.aps_reply_timeout_secs)
    }

    pub fn aps_reply_timeout_extended(&self) -> Duration {
        Duration::from_secs(self.aps_reply_timeout_extended_secs)
    }
}

/// The top-level object (spec.md C8). Everything else in the crate is reached
/// through it: the device table, the group registry, the radio handle every
/// device/group-endpoint sends through, and the persistence event bus.
pub struct ApplicationController {
    devices: DashMap<Eui64, Arc<Device>>,
    nwk_to_ieee: DashMap<Nwk, Eui64>,
    pub groups: Groups,
    pub io: Arc<RadioHandle>,
    pub bus: PersistenceBus,
    pub config: ApplicationConfig,
    pub ota: Arc<OtaManager>,
    pub backup: Arc<BackupManager>,
    pub topology: Arc<TopologyScanner>,
    state: SyncMutex<State>,
    /// Controller-level ZDO correlator, used only for requests that aren't
    /// addressed to a known `Device` yet — currently `_discover_unknown_device`
    /// (spec.md §4.8), which must resolve a NWK address's IEEE before a
    /// `Device` can even be constructed. Every other ZDO request flows
    /// through the issuing device's own pending table (C7/C14).
    pending: Requests<Vec<u8>>,
    ingress_task: SyncMutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
}

impl ApplicationController {
    pub fn new(radio: Arc<dyn RadioDriver>, config: ApplicationConfig) -> Arc<Self> {
        let semaphore = DynamicBoundedSemaphore::new(config.max_concurrent_requests);
        let io = RadioHandle::new(radio, semaphore);
        let ota = Arc::new(OtaManager::new(
            OtaImageIndex::new(),
            Duration::from_secs(config.ota_max_time_without_progress_secs),
        ));
        let backup = Arc::new(BackupManager::new());
        let topology = TopologyScanner::new(TopologyConfig {
            skip_coordinator: config.topo_skip_coordinator,
            ..TopologyConfig::default()
        });
        Arc::new(Self {
            devices: DashMap::new(),
            nwk_to_ieee: DashMap::new(),
            groups: Groups::new(),
            io,
            bus: PersistenceBus::new(),
            config,
            ota,
            backup,
            topology,
            state: SyncMutex::new(State::new()),
            pending: Requests::new(),
            ingress_task: SyncMutex::new(None),
            running: AtomicBool::new(false),
        })
    }

    pub fn node_info(&self) -> NodeInfo {
        self.state.lock().unwrap().node_information.clone()
    }

    pub fn network_info(&self) -> crate::state::NetworkInformation {
        self.state.lock().unwrap().network_information.clone()
    }

    // -- Device table ----------------------------------------------------

    pub fn device(&self, ieee: Eui64) -> Option<Arc<Device>> {
        self.devices.get(&ieee).map(|e| e.clone())
    }

    pub fn device_by_nwk(&self, nwk: Nwk) -> Option<Arc<Device>> {
        let ieee = *self.nwk_to_ieee.get(&nwk)?;
        self.device(ieee)
    }

    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.devices.iter().map(|e| e.clone()).collect()
    }

    /// Explicit removal (spec.md §3 Device lifecycle: "destroyed by explicit
    /// `remove` or by failed leave-timeout path"). Unlike a rejoin, this
    /// drops the device from both indices outright.
    pub fn remove_device(&self, ieee: Eui64) -> Option<Arc<Device>> {
        let removed = self.devices.remove(&ieee).map(|(_, d)| d);
        if let Some(dev) = &removed {
            self.nwk_to_ieee.remove(&dev.nwk());
            self.bus.emit(PersistenceEvent::DeviceRemoved { ieee });
        }
        removed
    }

    // -- Startup / shutdown -----------------------------------------------

    /// Bring the radio up and start ingress. `auto_form`: when the radio
    /// reports no stored network settings, form a new network and retry
    /// loading them rather than propagating the failure (spec.md §7).
    pub async fn startup(self: &Arc<Self>, auto_form: bool) -> Result<()> {
        self.io.radio.connect().await?;

        let info = match self.io.radio.load_network_info().await {
            Ok(info) => info,
            Err(ZigbeeError::NetworkNotFormed) if auto_form => {
                let desired = crate::state::NetworkInformation::default();
                self.io
                    .radio
                    .form_network(&desired)
                    .await
                    .map_err(|_| ZigbeeError::FormationFailure)?;
                self.io.radio.load_network_info().await?
            }
            Err(err) => return Err(err),
        };

        {
            let mut state = self.state.lock().unwrap();
            state.network_information = info;
            state.initialize_counters();
        }

        self.start_ingress();
        self.start_periodic_backups();
        self.start_periodic_topology_scans();
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.ingress_task.lock().unwrap().take() {
            handle.abort();
        }
        self.backup.stop_periodic_backups();
        self.topology.stop_periodic_scans();
        self.io.radio.disconnect().await
    }

    /// spec.md §4.7 "Periodic backups": snapshot on a configured interval
    /// and hand it to [`BackupManager::add_backup`], which drops older
    /// compatible backups whose frame counter isn't strictly greater.
    fn start_periodic_backups(self: &Arc<Self>) {
        let app = self.clone();
        self.backup.start_periodic_backups(Duration::from_secs(self.config.backup_period_secs), move || {
            NetworkBackup::from_state(app.network_info(), app.node_info())
        });
    }

    /// spec.md §4.8: one scan task at a time across router-class devices,
    /// re-armed every `topo_scan_period_secs`. Neighbor/route entries that
    /// reference a NWK address with no matching device trigger
    /// [`Self::discover_unknown_device`].
    fn start_periodic_topology_scans(self: &Arc<Self>) {
        let app = self.clone();
        let devices_snapshot: Arc<dyn Fn() -> Vec<Arc<Device>> + Send + Sync> =
            Arc::new(move || app.devices());
        let app = self.clone();
        let on_unknown_nwk: Arc<dyn Fn(Nwk) + Send + Sync> = Arc::new(move |nwk| app.discover_unknown_device(nwk));
        let coordinator_ieee = Some(self.node_info().ieee);
        self.topology.start_periodic_scans(
            Duration::from_secs(self.config.topo_scan_period_secs),
            devices_snapshot,
            coordinator_ieee,
            on_unknown_nwk,
        );
    }

    /// Explicit, preemptible scan (spec.md §4.8 / §8 scenario 6): cancels
    /// whatever scan is currently running and starts a new one immediately,
    /// independent of the periodic schedule.
    pub fn scan_topology(self: &Arc<Self>) {
        let app = self.clone();
        let coordinator_ieee = Some(self.node_info().ieee);
        self.topology.scan(self.devices(), coordinator_ieee, move |nwk| app.discover_unknown_device(nwk));
    }

    /// `_discover_unknown_device(nwk)`: resolve a NWK address surfaced by the
    /// topology scanner (or any other collaborator) to an IEEE address via
    /// ZDO `IEEE_addr_req`, then run it through the normal join path. A
    /// no-op if the NWK is already known (spec.md §4.8).
    pub fn discover_unknown_device(self: &Arc<Self>, nwk: Nwk) {
        if self.device_by_nwk(nwk).is_some() {
            return;
        }
        let app = self.clone();
        tokio::spawn(async move {
            let mut args = Vec::new();
            nwk.serialize_to(&mut args);
            args.push(0x00); // RequestType: single device response
            args.push(0x00); // StartIndex
            match app.send_zdo_to_nwk(nwk, ZdoCommandId::IEEE_ADDR_REQ, args, app.config.aps_reply_timeout()).await {
                Ok(reply) => {
                    let Ok((status_byte, rest)) = u8::deserialize(&reply) else { return };
                    if !ZdoStatus(status_byte).is_success() {
                        return;
                    }
                    if let Ok((ieee, _)) = Eui64::deserialize(rest) {
                        app.handle_join(nwk, ieee, None).await;
                    }
                }
                Err(err) => {
                    tracing::debug!(%nwk, error = %err, "failed to resolve unknown device's IEEE address");
                }
            }
        });
    }

    /// Controller-level ZDO request to a NWK address with no `Device` on
    /// file yet (the discovery request itself). Shares the same
    /// `ZdoCommandId`/TSN-in-body wire shape as [`Device::send_zdo`] but
    /// correlates through `self.pending` instead of a device's table, since
    /// no device exists to own one.
    async fn send_zdo_to_nwk(
        self: &Arc<Self>,
        nwk: Nwk,
        command_id: ZdoCommandId,
        args: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        let tsn = self.io.next_tsn();
        let mut data = vec![tsn];
        data.extend(args);
        let scope = self.pending.reserve(tsn)?;
        self.io
            .send(ZigbeePacket {
                src_ep: 0,
                dst_ep: 0,
                dst: AddrModeAddress::Nwk(nwk),
                profile_id: 0x0000,
                cluster_id: command_id.0,
                data,
                tx_options: TxOptions::default(),
                radius: 0,
            })
            .await?;
        scope.wait(timeout).await
    }

    pub async fn permit_join(&self, duration_secs: u8) -> Result<()> {
        self.io.radio.permit_ncp(duration_secs).await
    }

    fn start_ingress(self: &Arc<Self>) {
        let app = self.clone();
        let mut rx = self.io.radio.subscribe();
        let handle = tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                app.handle_radio_event(event).await;
            }
        });
        *self.ingress_task.lock().unwrap() = Some(handle);
    }

    /// Inbound packets are processed strictly in arrival order up to the
    /// point of dispatch; a handler that needs further I/O spawns its own
    /// task rather than blocking the ingress loop (spec.md §5 "Ordering
    /// guarantees").
    async fn handle_radio_event(self: &Arc<Self>, event: RadioEvent) {
        match event {
            RadioEvent::PacketReceived(packet) => {
                let app = self.clone();
                tokio::spawn(async move { app.handle_packet(packet).await });
            }
            RadioEvent::DeviceJoined { nwk, ieee, capability: _ } => {
                let app = self.clone();
                tokio::spawn(async move { app.handle_join(nwk, ieee, None).await });
            }
            RadioEvent::MacPoll { .. } | RadioEvent::ConnectivityChanged { .. } => {}
        }
    }

    // -- Packet ingress demux ---------------------------------------------

    async fn handle_packet(self: &Arc<Self>, packet: IncomingPacket) {
        if packet.dst_ep == 0 {
            self.handle_zdo_packet(packet).await;
            return;
        }

        let Some(nwk) = self.nwk_of(&packet.src) else {
            tracing::debug!("packet from IEEE-addressed source with no NWK on file dropped");
            return;
        };
        let Some(device) = self.device_by_nwk(nwk) else {
            tracing::debug!(%nwk, "packet from unknown device dropped");
            return;
        };
        device.update_signal(Some(packet.lqi), Some(packet.rssi));
        device.handle_zcl_packet(packet.dst_ep, packet.cluster_id, packet.data).await;
    }

    fn nwk_of(&self, addr: &AddrModeAddress) -> Option<Nwk> {
        match addr {
            AddrModeAddress::Nwk(nwk) | AddrModeAddress::Broadcast(nwk) => Some(*nwk),
            AddrModeAddress::Ieee(ieee) => self.devices.get(ieee).map(|d| d.nwk()),
            AddrModeAddress::Group(_) => None,
        }
    }

    async fn handle_zdo_packet(self: &Arc<Self>, packet: IncomingPacket) {
        let command_id = crate::zdo::ZdoCommandId(packet.cluster_id);
        let data = packet.data;
        if data.is_empty() {
            return;
        }
        let tsn = data[0];
        let body = &data[1..];

        if command_id.is_response() {
            let device = self.nwk_of(&packet.src).and_then(|nwk| self.device_by_nwk(nwk));
            let resolved = match &device {
                Some(device) => device.resolve_zdo_response(tsn, body.to_vec()),
                None => false,
            };
            // Fall back to the controller-level correlator (e.g. the
            // `discover_unknown_device` IEEE_addr_req, which by definition
            // has no `Device` to resolve against yet).
            if !resolved && !self.pending.resolve(tsn, body.to_vec()) {
                tracing::debug!(tsn, "orphan ZDO response dropped");
            }
            return;
        }

        match command_id {
            ZdoCommandId::DEVICE_ANNCE => {
                if let Ok((announce, _)) = DeviceAnnounce::deserialize(body) {
                    self.handle_join(announce.nwk, announce.ieee, None).await;
                }
            }
            ZdoCommandId::MATCH_DESC_REQ => {
                if let Ok((req, _)) = MatchDescRequest::deserialize(body) {
                    self.reply_match_desc(&packet.src, tsn, &req).await;
                }
            }
            ZdoCommandId::IEEE_ADDR_REQ => {
                self.reply_ieee_addr(&packet.src, tsn).await;
            }
            ZdoCommandId::NWK_ADDR_REQ => {
                self.reply_nwk_addr(&packet.src, tsn).await;
            }
            ZdoCommandId::MGMT_PERMIT_JOINING_REQ => {
                if let Some(&duration) = body.first() {
                    tracing::info!(duration, "peer requested permit join relay");
                }
            }
            other => {
                tracing::debug!(command = ?other, "unhandled ZDO request");
            }
        }
    }

    async fn reply_match_desc(self: &Arc<Self>, dst: &AddrModeAddress, tsn: u8, req: &MatchDescRequest) {
        let our_nwk = self.node_info().nwk;
        let (status, endpoints) = handle_match_desc(req, our_nwk);
        let mut data = vec![tsn, status];
        our_nwk.serialize_to(&mut data);
        LvList(endpoints).serialize_to(&mut data);
        let _ = self
            .io
            .send(ZigbeePacket {
                src_ep: 0,
                dst_ep: 0,
                dst: *dst,
                profile_id: 0x0000,
                cluster_id: ZdoCommandId::MATCH_DESC_RSP.0,
                data,
                tx_options: TxOptions::default(),
                radius: 0,
            })
            .await;
    }

    async fn reply_ieee_addr(self: &Arc<Self>, dst: &AddrModeAddress, tsn: u8) {
        let node = self.node_info();
        let mut data = vec![tsn, ZdoStatus::SUCCESS.0];
        node.ieee.serialize_to(&mut data);
        node.nwk.serialize_to(&mut data);
        data.push(0);
        data.push(0);
        let _ = self
            .io
            .send(ZigbeePacket {
                src_ep: 0,
                dst_ep: 0,
                dst: *dst,
                profile_id: 0x0000,
                cluster_id: ZdoCommandId::IEEE_ADDR_RSP.0,
                data,
                tx_options: TxOptions::default(),
                radius: 0,
            })
            .await;
    }

    async fn reply_nwk_addr(self: &Arc<Self>, dst: &AddrModeAddress, tsn: u8) {
        let node = self.node_info();
        let mut data = vec![tsn, ZdoStatus::SUCCESS.0];
        node.ieee.serialize_to(&mut data);
        node.nwk.serialize_to(&mut data);
        data.push(0);
        data.push(0);
        let _ = self
            .io
            .send(ZigbeePacket {
                src_ep: 0,
                dst_ep: 0,
                dst: *dst,
                profile_id: 0x0000,
                cluster_id: ZdoCommandId::NWK_ADDR_RSP.0,
                data,
                tx_options: TxOptions::default(),
                radius: 0,
            })
            .await;
    }

    // -- Join / rejoin -----------------------------------------------------

    /// spec.md §4.3 "Rejoin semantics", all four cases.
    pub async fn handle_join(self: &Arc<Self>, nwk: Nwk, ieee: Eui64, _parent_nwk: Option<Nwk>) -> Arc<Device> {
        if let Some(existing) = self.device(ieee) {
            let same_nwk = existing.nwk() == nwk;
            self.nwk_to_ieee.insert(nwk, ieee);
            if !same_nwk {
                existing.set_nwk(nwk);
            }

            match (same_nwk, existing.status()) {
                // (b) known IEEE, same NWK, not yet initialized: reschedule,
                // no join event.
                (true, crate::device::DeviceStatus::New | crate::device::DeviceStatus::ZdoInit) => {
                    self.reschedule_initialize(existing.clone());
                }
                // (c) known IEEE, different NWK: update NWK, emit
                // device_joined, reschedule initialize.
                (false, _) => {
                    self.bus.emit(PersistenceEvent::DeviceJoined { ieee });
                    self.reschedule_initialize(existing.clone());
                }
                // (d) known IEEE, same NWK, already initialized: nothing but
                // an (elided, C13-owned) group-membership re-scan.
                (true, crate::device::DeviceStatus::EndpointsInit) => {}
            }
            return existing;
        }

        // (a) IEEE unknown: create, mark joined, schedule initialize.
        let device = Device::new(ieee, nwk, self.io.clone(), self.config.aps_reply_timeout());
        self.devices.insert(ieee, device.clone());
        self.nwk_to_ieee.insert(nwk, ieee);
        self.bus.emit(PersistenceEvent::DeviceJoined { ieee });
        self.reschedule_initialize(device.clone());
        device
    }

    /// Not a stored back-reference from `Device` to the controller — only a
    /// cloned broadcast sender is captured, so no `Device` ↔ controller
    /// cycle survives past one initialization attempt (spec.md §9 "cyclic
    /// references").
    fn reschedule_initialize(&self, device: Arc<Device>) {
        let bus_ieee = device.ieee;
        let tx = self.bus.sender();
        device.schedule_initialize_with(move |ok| {
            if ok {
                let _ = tx.send(PersistenceEvent::DeviceInitialized { ieee: bus_ieee });
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;

    struct NullRadio {
        tx: tokio::sync::broadcast::Sender<RadioEvent>,
        formed: AtomicBool,
    }

    impl NullRadio {
        fn new() -> Arc<Self> {
            let (tx, _) = tokio::sync::broadcast::channel(16);
            Arc::new(Self { tx, formed: AtomicBool::new(false) })
        }
    }

    impl RadioDriver for NullRadio {
        fn connect<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
            Box::pin(async { Ok(()) })
        }
        fn disconnect<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
            Box::pin(async { Ok(()) })
        }
        fn form_network<'a>(
            &'a self,
            info: &'a crate::state::NetworkInformation,
        ) -> Pin<Box<dyn Future<Output = Result<crate::state::NetworkInformation>> + Send + 'a>> {
            Box::pin(async move {
                self.formed.store(true, Ordering::SeqCst);
                Ok(info.clone())
            })
        }
        fn load_network_info<'a>(
            &'a self,
        ) -> Pin<Box<dyn Future<Output = Result<crate::state::NetworkInformation>> + Send + 'a>> {
            Box::pin(async {
                if self.formed.load(Ordering::SeqCst) {
                    Ok(crate::state::NetworkInformation::default())
                } else {
                    Err(ZigbeeError::NetworkNotFormed)
                }
            })
        }
        fn write_network_info<'a>(
            &'a self,
            _info: &'a crate::state::NetworkInformation,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
            Box::pin(async { Ok(()) })
        }
        fn send_packet<'a>(
            &'a self,
            _packet: ZigbeePacket,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
            Box::pin(async { Ok(()) })
        }
        fn permit_ncp<'a>(&'a self, _duration_secs: u8) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
            Box::pin(async { Ok(()) })
        }
        fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RadioEvent> {
            self.tx.subscribe()
        }
    }

    #[tokio::test]
    async fn startup_auto_forms_when_radio_reports_not_formed() {
        let radio = NullRadio::new();
        let app = ApplicationController::new(radio, ApplicationConfig::default());
        app.startup(true).await.unwrap();
    }

    #[tokio::test]
    async fn startup_without_auto_form_propagates_network_not_formed() {
        let radio = NullRadio::new();
        let app = ApplicationController::new(radio, ApplicationConfig::default());
        let err = app.startup(false).await.unwrap_err();
        assert!(matches!(err, ZigbeeError::NetworkNotFormed));
    }

    #[tokio::test]
    async fn unknown_ieee_join_creates_a_device_and_emits_joined() {
        let radio = NullRadio::new();
        let app = ApplicationController::new(radio, ApplicationConfig::default());
        let mut rx = app.bus.subscribe();

        let ieee = Eui64([1, 2, 3, 4, 5, 6, 7, 8]);
        app.handle_join(Nwk(0x1111), ieee, None).await;

        assert!(app.device(ieee).is_some());
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, PersistenceEvent::DeviceJoined { ieee: got } if got == ieee));
    }

    #[tokio::test]
    async fn rejoin_under_a_new_nwk_updates_the_index_and_emits_joined_again() {
        let radio = NullRadio::new();
        let app = ApplicationController::new(radio, ApplicationConfig::default());
        let ieee = Eui64([9, 9, 9, 9, 9, 9, 9, 9]);

        app.handle_join(Nwk(0x2222), ieee, None).await;
        let mut rx = app.bus.subscribe();
        app.handle_join(Nwk(0x3333), ieee, None).await;

        assert_eq!(app.device(ieee).unwrap().nwk(), Nwk(0x3333));
        assert!(app.device_by_nwk(Nwk(0x3333)).is_some());
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, PersistenceEvent::DeviceJoined { .. }));
    }

    #[tokio::test]
    async fn remove_device_drops_both_indices_and_emits_removed() {
        let radio = NullRadio::new();
        let app = ApplicationController::new(radio, ApplicationConfig::default());
        let ieee = Eui64([4, 4, 4, 4, 4, 4, 4, 4]);
        app.handle_join(Nwk(0x4444), ieee, None).await;
        let mut rx = app.bus.subscribe();

        app.remove_device(ieee);

        assert!(app.device(ieee).is_none());
        assert!(app.device_by_nwk(Nwk(0x4444)).is_none());
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, PersistenceEvent::DeviceRemoved { ieee: got } if got == ieee));
    }
}
