//! C7 — device: per-device state, the ZDO/endpoint init state machine, and
//! the pending-request correlator every cluster command flows through.
//!
//! Grounded on `zigpy/device.py` (`Status.NEW`/`ZDO_INIT`/`ENDPOINTS_INIT`,
//! `schedule_initialize`, `Device._initialize`'s Active_EP_req →
//! Simple_Desc_req → per-endpoint Basic discovery sequence), widened from a
//! flat IEEE/NWK/`last_seen`/`lqi` record to the general endpoint/cluster
//! graph.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex as SyncMutex};
use std::time::{Duration, Instant};

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::cluster::ClusterTransport;
use crate::endpoint::{Dispatch, Endpoint};
use crate::error::Result;
use crate::listener::{spawn_catching, Requests};
use crate::radio::{AddrModeAddress, RadioHandle, TxOptions, ZigbeePacket};
use crate::types::{Eui64, Nwk, Wire};
use crate::zcl::{FrameControl, ZclHeader};
use crate::zdo::{NodeDescriptor, SizePrefixedSimpleDescriptor, ZdoCommandId, ZdoStatus};

/// spec.md §4.3 device lifecycle: a freshly-announced device has neither its
/// endpoint list nor any endpoint's cluster schema yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    New,
    ZdoInit,
    EndpointsInit,
}

/// A device on the network, keyed by its immutable IEEE address. `nwk` may
/// change across a rejoin; everything mutable lives behind interior
/// mutability so the application controller can hold devices as `Arc<Device>`
/// shared between the ingress task, the init task, and request callers.
pub struct Device {
    pub ieee: Eui64,
    nwk: SyncMutex<Nwk>,
    node_descriptor: SyncMutex<Option<NodeDescriptor>>,
    status: SyncMutex<DeviceStatus>,
    lqi: SyncMutex<Option<u8>>,
    rssi: SyncMutex<Option<i8>>,
    last_seen: SyncMutex<Option<Instant>>,
    relays: SyncMutex<Option<Vec<Nwk>>>,
    model: SyncMutex<Option<String>>,
    manufacturer: SyncMutex<Option<String>>,
    endpoints: AsyncMutex<HashMap<u8, Endpoint>>,
    pending: Requests<Vec<u8>>,
    io: Arc<RadioHandle>,
    aps_reply_timeout: Duration,
    init_task: SyncMutex<Option<JoinHandle<()>>>,
}

impl Device {
    pub fn new(ieee: Eui64, nwk: Nwk, io: Arc<RadioHandle>, aps_reply_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            ieee,
            nwk: SyncMutex::new(nwk),
            node_descriptor: SyncMutex::new(None),
            status: SyncMutex::new(DeviceStatus::New),
            lqi: SyncMutex::new(None),
            rssi: SyncMutex::new(None),
            last_seen: SyncMutex::new(None),
            relays: SyncMutex::new(None),
            model: SyncMutex::new(None),
            manufacturer: SyncMutex::new(None),
            endpoints: AsyncMutex::new(HashMap::new()),
            pending: Requests::new(),
            io,
            aps_reply_timeout,
            init_task: SyncMutex::new(None),
        })
    }

    pub fn nwk(&self) -> Nwk {
        *self.nwk.lock().unwrap()
    }

    /// A device can rejoin under a new short address; the IEEE address is
    /// the only thing that stays the table key (spec.md §4.3 rejoin cases).
    pub fn set_nwk(&self, nwk: Nwk) {
        *self.nwk.lock().unwrap() = nwk;
    }

    pub fn status(&self) -> DeviceStatus {
        *self.status.lock().unwrap()
    }

    pub fn node_descriptor(&self) -> Option<NodeDescriptor> {
        *self.node_descriptor.lock().unwrap()
    }

    pub fn set_node_descriptor(&self, desc: Option<NodeDescriptor>) {
        *self.node_descriptor.lock().unwrap() = desc;
    }

    pub fn lqi(&self) -> Option<u8> {
        *self.lqi.lock().unwrap()
    }

    pub fn rssi(&self) -> Option<i8> {
        *self.rssi.lock().unwrap()
    }

    pub fn last_seen(&self) -> Option<Instant> {
        *self.last_seen.lock().unwrap()
    }

    pub fn relays(&self) -> Option<Vec<Nwk>> {
        self.relays.lock().unwrap().clone()
    }

    pub fn set_relays(&self, relays: Option<Vec<Nwk>>) {
        *self.relays.lock().unwrap() = relays;
    }

    pub fn model(&self) -> Option<String> {
        self.model.lock().unwrap().clone()
    }

    pub fn manufacturer(&self) -> Option<String> {
        self.manufacturer.lock().unwrap().clone()
    }

    pub fn update_signal(&self, lqi: Option<u8>, rssi: Option<i8>) {
        if lqi.is_some() {
            *self.lqi.lock().unwrap() = lqi;
        }
        if rssi.is_some() {
            *self.rssi.lock().unwrap() = rssi;
        }
    }

    /// Any inbound traffic — a resolved request, a report, an unsolicited
    /// command — refreshes `last_seen`. A *timed-out* request does not
    /// (spec.md §4.3: liveness is only ever asserted by something actually
    /// arriving).
    fn touch(&self) {
        *self.last_seen.lock().unwrap() = Some(Instant::now());
    }

    pub async fn endpoints(&self) -> tokio::sync::MutexGuard<'_, HashMap<u8, Endpoint>> {
        self.endpoints.lock().await
    }

    pub async fn endpoint_ids(&self) -> Vec<u8> {
        self.endpoints.lock().await.keys().copied().collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    // -- ZDO request issuing ------------------------------------------

    /// Send a ZDO request to this device. ZDO's own 1-byte transaction
    /// sequence number occupies the same per-device correlator as ZCL TSNs
    /// (spec.md §4.4 describes one TSN-indexed pending table per device, not
    /// two parallel ones).
    pub async fn send_zdo(
        &self,
        command_id: ZdoCommandId,
        args: Vec<u8>,
        expect_reply: bool,
    ) -> Result<Option<Vec<u8>>> {
        let tsn = self.io.next_tsn();
        let mut data = vec![tsn];
        data.extend(args);

        let scope = if expect_reply { Some(self.pending.reserve(tsn)?) } else { None };

        let packet = ZigbeePacket {
            src_ep: 0,
            dst_ep: 0,
            dst: AddrModeAddress::Nwk(self.nwk()),
            profile_id: 0x0000,
            cluster_id: command_id.0,
            data,
            tx_options: TxOptions::default(),
            radius: 0,
        };
        self.io.send(packet).await?;

        match scope {
            Some(scope) => {
                let reply = scope.wait(self.aps_reply_timeout).await?;
                self.touch();
                Ok(Some(reply))
            }
            None => Ok(None),
        }
    }

    /// Resolve an inbound ZDO response against this device's pending table
    /// (dispatched by the application controller after it recognizes
    /// `cluster_id & 0x8000` on endpoint 0). Returns `false` for an orphan
    /// match — a response whose TSN nothing is waiting on.
    pub fn resolve_zdo_response(&self, tsn: u8, payload: Vec<u8>) -> bool {
        self.touch();
        self.pending.resolve(tsn, payload)
    }

    /// Parse and route an inbound ZCL frame addressed to one of this
    /// device's endpoints (spec.md §4.2/§4.4 inbound dispatch).
    pub async fn handle_zcl_packet(&self, endpoint_id: u8, cluster_id: u16, data: Vec<u8>) {
        self.touch();
        let dispatch = {
            let mut endpoints = self.endpoints.lock().await;
            let Some(ep) = endpoints.get_mut(&endpoint_id) else {
                tracing::debug!(ieee = %self.ieee, endpoint_id, "frame for unknown endpoint dropped");
                return;
            };
            let Ok((header, payload)) = ep.deserialize_zcl(&data) else {
                tracing::debug!(ieee = %self.ieee, endpoint_id, "malformed ZCL frame dropped");
                return;
            };
            ep.handle_message(header, cluster_id, payload)
        };
        match dispatch {
            Dispatch::ReportAttributesHandled { header } => {
                // spec.md §4.2: "If the frame's disable_default_response bit
                // is clear, send a default-response with SUCCESS using the
                // inbound TSN."
                if !header.frame_control.disable_default_response {
                    self.send_default_response(endpoint_id, cluster_id, &header).await;
                }
            }
            Dispatch::Awaiting { header, cluster_id, payload } => {
                if !self.pending.resolve(header.tsn, payload.clone()) {
                    let mut endpoints = self.endpoints.lock().await;
                    if let Some(ep) = endpoints.get_mut(&endpoint_id) {
                        ep.dispatch_unsolicited(&header, cluster_id, payload);
                    }
                }
            }
        }
    }

    /// Send a foundation `DefaultResponse` (command id 0x0b) acking
    /// `header.command_id` with `SUCCESS`, addressed back at whichever
    /// direction sent us `header` (spec.md §4.2).
    async fn send_default_response(&self, endpoint_id: u8, cluster_id: u16, header: &ZclHeader) {
        use crate::zcl::foundation::{DefaultResponse, KnownStatus, Status};

        let reply = DefaultResponse { command_id: header.command_id, status: Status::Known(KnownStatus::Success) };
        let frame_control = FrameControl {
            cluster_specific: false,
            manufacturer_specific: header.frame_control.manufacturer_specific,
            direction_server_to_client: !header.frame_control.direction_server_to_client,
            disable_default_response: false,
        };
        if let Err(err) = send_zcl_reply(
            self,
            endpoint_id,
            cluster_id,
            frame_control,
            header.manufacturer_code,
            header.tsn,
            crate::zcl::foundation::GeneralCommand::DefaultResponse as u8,
            reply.serialize(),
        )
        .await
        {
            tracing::debug!(ieee = %self.ieee, endpoint_id, error = %err, "failed to send report-attributes default response");
        }
    }

    // -- Init state machine --------------------------------------------

    /// Kick off (or restart) ZDO/endpoint initialization. Calling this again
    /// while a previous attempt is still running cancels it first — the
    /// source's `schedule_initialize` cancels any outstanding `_initialize`
    /// task before scheduling a new one, which matters when a device
    /// re-announces mid-initialization (spec.md §4.3).
    pub fn schedule_initialize(self: &Arc<Self>) {
        self.schedule_initialize_with(|_| {});
    }

    /// Same as [`Device::schedule_initialize`], plus a completion hook run
    /// once `run_initialize` returns. The application controller (C8) uses
    /// this rather than a stored back-reference from `Device` to itself — the
    /// closure is consumed by the spawned task and dropped with it, so no
    /// `Device` ↔ controller cycle survives past one initialization attempt
    /// (spec.md §9 "cyclic references").
    pub fn schedule_initialize_with<F>(self: &Arc<Self>, on_complete: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let dev = self.clone();
        let mut guard = self.init_task.lock().unwrap();
        if let Some(old) = guard.take() {
            old.abort();
        }
        let handle = spawn_catching("device_initialize", async move {
            let result = dev.run_initialize().await;
            on_complete(result.is_ok());
            result
        });
        *guard = Some(handle);
    }

    async fn run_initialize(self: Arc<Self>) -> Result<()> {
        let active_ep = self.active_ep_req().await?;
        *self.status.lock().unwrap() = DeviceStatus::ZdoInit;

        for endpoint_id in active_ep {
            match self.simple_desc_req(endpoint_id).await {
                Ok(Some(desc)) => {
                    let mut ep = Endpoint::from_simple_descriptor(&desc);
                    if let Err(err) = ep.initialize(&*self).await {
                        tracing::warn!(ieee = %self.ieee, endpoint_id, error = %err, "endpoint initialize failed");
                    }
                    if ep.manufacturer.is_some() {
                        *self.manufacturer.lock().unwrap() = ep.manufacturer.clone();
                    }
                    if ep.model.is_some() {
                        *self.model.lock().unwrap() = ep.model.clone();
                    }
                    self.endpoints.lock().await.insert(endpoint_id, ep);
                }
                Ok(None) => {
                    tracing::debug!(ieee = %self.ieee, endpoint_id, "no simple descriptor returned");
                }
                Err(err) => {
                    tracing::warn!(ieee = %self.ieee, endpoint_id, error = %err, "simple descriptor request failed");
                }
            }
        }

        *self.status.lock().unwrap() = DeviceStatus::EndpointsInit;
        Ok(())
    }

    async fn active_ep_req(&self) -> Result<Vec<u8>> {
        let mut args = Vec::new();
        self.nwk().serialize_to(&mut args);
        let reply = self.send_zdo(ZdoCommandId::ACTIVE_EP_REQ, args, true).await?.unwrap_or_default();
        let (status_byte, rest) = u8::deserialize(&reply)?;
        let status = ZdoStatus(status_byte);
        if !status.is_success() {
            return Err(crate::error::ZigbeeError::InvalidResponse(
                crate::error::InvalidResponse::BadStatus {
                    command: "active_ep_req".into(),
                    status: format!("{status:?}"),
                },
            ));
        }
        let (_nwk_of_interest, rest) = Nwk::deserialize(rest)?;
        let (endpoints, _) = crate::types::LvList::<u8>::deserialize(rest)?;
        Ok(endpoints.0)
    }

    async fn simple_desc_req(&self, endpoint_id: u8) -> Result<Option<crate::zdo::SimpleDescriptor>> {
        let mut args = Vec::new();
        self.nwk().serialize_to(&mut args);
        args.push(endpoint_id);
        let reply = self.send_zdo(ZdoCommandId::SIMPLE_DESC_REQ, args, true).await?.unwrap_or_default();
        let (_status_byte, rest) = u8::deserialize(&reply)?;
        let (_nwk_of_interest, rest) = Nwk::deserialize(rest)?;
        let (desc, _) = SizePrefixedSimpleDescriptor::deserialize(rest)?;
        Ok(desc)
    }
}

impl ClusterTransport for Device {
    fn send<'a>(
        &'a self,
        endpoint_id: u8,
        cluster_id: u16,
        frame_control: FrameControl,
        manufacturer_code: Option<u16>,
        command_id: u8,
        payload: Vec<u8>,
        expect_reply: bool,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>>> + Send + 'a>> {
        Box::pin(async move {
            let tsn = self.io.next_tsn();
            let header = ZclHeader { frame_control, manufacturer_code, tsn, command_id };
            let mut data = header.serialize();
            data.extend(payload);

            let scope = if expect_reply { Some(self.pending.reserve(tsn)?) } else { None };

            let packet = ZigbeePacket {
                src_ep: 1,
                dst_ep: endpoint_id,
                dst: AddrModeAddress::Nwk(self.nwk()),
                profile_id: 0x0104,
                cluster_id,
                data,
                tx_options: TxOptions { ack: true, use_network_key: true },
                radius: 0,
            };
            self.io.send(packet).await?;

            match scope {
                Some(scope) => {
                    let reply = scope.wait(self.aps_reply_timeout).await?;
                    self.touch();
                    Ok(Some(reply))
                }
                None => Ok(None),
            }
        })
    }
}

/// Send a ZCL reply frame that reuses an *inbound* TSN rather than
/// allocating a fresh one (ZCL convention: a reply to command X carries X's
/// TSN, not a new allocation). Used by the OTA manager (C10) to answer
/// unsolicited `query_next_image`/`image_block`/`upgrade_end` commands.
pub async fn send_zcl_reply(
    device: &Device,
    endpoint_id: u8,
    cluster_id: u16,
    frame_control: FrameControl,
    manufacturer_code: Option<u16>,
    tsn: u8,
    command_id: u8,
    payload: Vec<u8>,
) -> Result<()> {
    let header = ZclHeader { frame_control, manufacturer_code, tsn, command_id };
    let mut data = header.serialize();
    data.extend(payload);
    let packet = ZigbeePacket {
        src_ep: 1,
        dst_ep: endpoint_id,
        dst: AddrModeAddress::Nwk(device.nwk()),
        profile_id: 0x0104,
        cluster_id,
        data,
        tx_options: TxOptions { ack: true, use_network_key: true },
        radius: 0,
    };
    device.io.send(packet).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::DynamicBoundedSemaphore;
    use crate::radio::{RadioDriver, RadioEvent};

    struct NullRadio;

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
            Box::pin(async move { Ok(info.clone()) })
        }
        fn load_network_info<'a>(
            &'a self,
        ) -> Pin<Box<dyn Future<Output = Result<crate::state::NetworkInformation>> + Send + 'a>> {
            Box::pin(async { Ok(crate::state::NetworkInformation::default()) })
        }
        fn write_network_info<'a>(
            &'a self,
            _info: &'a crate::state::NetworkInformation,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
            Box::pin(async { Ok(()) })
        }
        fn send_packet<'a>(&'a self, _packet: ZigbeePacket) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
            Box::pin(async { Ok(()) })
        }
        fn permit_ncp<'a>(&'a self, _duration_secs: u8) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
            Box::pin(async { Ok(()) })
        }
        fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RadioEvent> {
            tokio::sync::broadcast::channel(1).1
        }
    }

    fn test_device() -> Arc<Device> {
        let io = RadioHandle::new(Arc::new(NullRadio), DynamicBoundedSemaphore::new(8));
        Device::new(Eui64([1, 2, 3, 4, 5, 6, 7, 8]), Nwk(0x1234), io, Duration::from_millis(50))
    }

    struct CapturingRadio {
        sent: SyncMutex<Vec<ZigbeePacket>>,
    }

    impl RadioDriver for CapturingRadio {
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
            Box::pin(async move { Ok(info.clone()) })
        }
        fn load_network_info<'a>(
            &'a self,
        ) -> Pin<Box<dyn Future<Output = Result<crate::state::NetworkInformation>> + Send + 'a>> {
            Box::pin(async { Ok(crate::state::NetworkInformation::default()) })
        }
        fn write_network_info<'a>(
            &'a self,
            _info: &'a crate::state::NetworkInformation,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
            Box::pin(async { Ok(()) })
        }
        fn send_packet<'a>(&'a self, packet: ZigbeePacket) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
            self.sent.lock().unwrap().push(packet);
            Box::pin(async { Ok(()) })
        }
        fn permit_ncp<'a>(&'a self, _duration_secs: u8) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
            Box::pin(async { Ok(()) })
        }
        fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RadioEvent> {
            tokio::sync::broadcast::channel(1).1
        }
    }

    fn test_device_with_capturing_radio() -> (Arc<Device>, Arc<CapturingRadio>) {
        let radio = Arc::new(CapturingRadio { sent: SyncMutex::new(Vec::new()) });
        let io = RadioHandle::new(radio.clone(), DynamicBoundedSemaphore::new(8));
        let dev = Device::new(Eui64([1, 2, 3, 4, 5, 6, 7, 8]), Nwk(0x1234), io, Duration::from_millis(50));
        (dev, radio)
    }

    #[tokio::test]
    async fn new_device_has_no_endpoints_and_status_new() {
        let dev = test_device();
        assert_eq!(dev.status(), DeviceStatus::New);
        assert!(dev.endpoint_ids().await.is_empty());
    }

    #[tokio::test]
    async fn send_zdo_without_reply_does_not_reserve_a_tsn() {
        let dev = test_device();
        let result = dev.send_zdo(ZdoCommandId::MGMT_PERMIT_JOINING_REQ, vec![0x3c, 0x00], false).await;
        assert!(result.unwrap().is_none());
        assert_eq!(dev.pending_count(), 0);
    }

    #[tokio::test]
    async fn send_zdo_with_reply_times_out_when_nothing_answers() {
        let dev = test_device();
        let result = dev.send_zdo(ZdoCommandId::ACTIVE_EP_REQ, vec![0x34, 0x12], true).await;
        assert!(matches!(result, Err(crate::error::ZigbeeError::Timeout)));
        assert_eq!(dev.pending_count(), 0);
    }

    #[tokio::test]
    async fn unknown_endpoint_frame_is_dropped_without_panicking() {
        let dev = test_device();
        dev.handle_zcl_packet(5, crate::cluster::id::ON_OFF, vec![0x08, 0x01, 0x01]).await;
    }

    fn on_off_descriptor() -> crate::zdo::SimpleDescriptor {
        crate::zdo::SimpleDescriptor {
            endpoint: 1,
            profile: 0x0104,
            device_type: 0x0100,
            device_version: 1,
            input_clusters: vec![crate::cluster::id::ON_OFF],
            output_clusters: vec![],
        }
    }

    fn report_attributes_frame(tsn: u8, disable_default_response: bool) -> Vec<u8> {
        let header = ZclHeader {
            frame_control: crate::zcl::FrameControl {
                cluster_specific: false,
                manufacturer_specific: false,
                direction_server_to_client: true,
                disable_default_response,
            },
            manufacturer_code: None,
            tsn,
            command_id: crate::zcl::foundation::GeneralCommand::ReportAttributes as u8,
        };
        let mut data = header.serialize();
        crate::zcl::foundation::Attribute {
            attrid: 0x0000,
            value: crate::zcl::foundation::TypeValue(crate::zcl::foundation::AttributeValue::Boolean(true)),
        }
        .serialize_to(&mut data);
        data
    }

    /// spec.md §4.2: a report-attributes frame with `disable_default_response`
    /// clear is owed a default-response carrying SUCCESS and the inbound TSN.
    #[tokio::test]
    async fn report_attributes_sends_default_response_when_not_disabled() {
        let (dev, radio) = test_device_with_capturing_radio();
        dev.endpoints().await.insert(1, Endpoint::from_simple_descriptor(&on_off_descriptor()));

        dev.handle_zcl_packet(1, crate::cluster::id::ON_OFF, report_attributes_frame(9, false)).await;

        let sent = radio.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (reply_header, rest) = ZclHeader::deserialize(&sent[0].data).unwrap();
        assert_eq!(reply_header.tsn, 9);
        assert_eq!(reply_header.command_id, crate::zcl::foundation::GeneralCommand::DefaultResponse as u8);
        assert!(!reply_header.frame_control.direction_server_to_client);
        let (default_response, _) = crate::zcl::foundation::DefaultResponse::deserialize(rest).unwrap();
        assert_eq!(default_response.command_id, crate::zcl::foundation::GeneralCommand::ReportAttributes as u8);
        assert!(default_response.status.is_success());
    }

    #[tokio::test]
    async fn report_attributes_skips_default_response_when_disabled() {
        let (dev, radio) = test_device_with_capturing_radio();
        dev.endpoints().await.insert(1, Endpoint::from_simple_descriptor(&on_off_descriptor()));

        dev.handle_zcl_packet(1, crate::cluster::id::ON_OFF, report_attributes_frame(9, true)).await;

        assert!(radio.sent.lock().unwrap().is_empty());
    }
}
