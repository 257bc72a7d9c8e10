//! C10 — OTA manager: the per-device firmware upgrade session state
//! machine (spec.md §4.6).
//!
//! Grounded on `zigpy/ota/manager.py`'s callback-driven design: one
//! dispatcher (`query_next_image`/`image_block`/`upgrade_end`) registered
//! against the OTA cluster for the lifetime of a session via
//! [`crate::cluster::Cluster::add_listener`]/`remove_listener`, a stall
//! watchdog racing the session's completion future, and an
//! at-most-one-session-per-device guard.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::cluster::ClusterEvent;
use crate::device::{send_zcl_reply, Device};
use crate::error::{Result, ZigbeeError};
use crate::listener::ListenerHandle;
use crate::types::{Eui64, Wire};
use crate::zcl::FrameControl;

/// An available firmware image, keyed in the index by
/// `(manufacturer_id, image_type, model)` (spec.md §4.6).
#[derive(Debug, Clone)]
pub struct OtaImage {
    pub manufacturer_id: u16,
    pub image_type: u16,
    pub file_version: u32,
    pub model: Option<String>,
    pub data: Vec<u8>,
}

impl OtaImage {
    /// `should_update` (spec.md §4.6): the server only has something to
    /// offer if its image is newer than what the device already reports.
    pub fn should_update(&self, current_file_version: u32) -> bool {
        self.file_version > current_file_version
    }
}

/// Index of available images (spec.md §4.6 "picks an image from the index").
#[derive(Default)]
pub struct OtaImageIndex {
    images: HashMap<(u16, u16, Option<String>), Arc<OtaImage>>,
}

impl OtaImageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, image: OtaImage) {
        let key = (image.manufacturer_id, image.image_type, image.model.clone());
        self.images.insert(key, Arc::new(image));
    }

    pub fn find(&self, manufacturer_id: u16, image_type: u16, model: Option<&str>) -> Option<Arc<OtaImage>> {
        self.images.get(&(manufacturer_id, image_type, model.map(str::to_string))).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaStatus {
    Idle,
    WaitQuery,
    Stream,
    Done,
    Fail,
    Timeout,
    NoImageAvailable,
}

const CMD_IMAGE_NOTIFY: u8 = 0x00;
const CMD_QUERY_NEXT_IMAGE: u8 = 0x01;
const CMD_QUERY_NEXT_IMAGE_RESPONSE: u8 = 0x02;
const CMD_IMAGE_BLOCK: u8 = 0x03;
const CMD_IMAGE_BLOCK_RESPONSE: u8 = 0x05;
const CMD_UPGRADE_END: u8 = 0x06;
const CMD_UPGRADE_END_RESPONSE: u8 = 0x07;

fn server_frame_control() -> FrameControl {
    FrameControl {
        cluster_specific: true,
        manufacturer_specific: false,
        direction_server_to_client: true,
        disable_default_response: false,
    }
}

/// Live state for one device's upgrade (spec.md §4.6 state diagram).
struct OtaSession {
    endpoint_id: u8,
    status: Mutex<OtaStatus>,
    image: Arc<OtaImage>,
    last_progress: Mutex<Instant>,
    done_tx: Mutex<Option<oneshot::Sender<OtaStatus>>>,
}

impl OtaSession {
    fn touch(&self) {
        *self.last_progress.lock().unwrap() = Instant::now();
    }

    fn set_status(&self, status: OtaStatus) {
        *self.status.lock().unwrap() = status;
    }

    fn finish(&self, status: OtaStatus) {
        self.set_status(status);
        if let Some(tx) = self.done_tx.lock().unwrap().take() {
            let _ = tx.send(status);
        }
    }
}

/// The OTA manager (C10): one instance shared by the application controller,
/// owning the image index and the at-most-one-session-per-device table.
pub struct OtaManager {
    images: Mutex<OtaImageIndex>,
    sessions: DashMap<Eui64, Arc<OtaSession>>,
    max_time_without_progress: Duration,
    next_image_block_size: u8,
}

impl OtaManager {
    pub fn new(images: OtaImageIndex, max_time_without_progress: Duration) -> Self {
        Self { images: Mutex::new(images), sessions: DashMap::new(), max_time_without_progress, next_image_block_size: 64 }
    }

    pub fn add_image(&self, image: OtaImage) {
        self.images.lock().unwrap().insert(image);
    }

    /// Start an upgrade session for `device` (spec.md §4.6). Fails with
    /// [`ZigbeeError::OtaSessionInProgress`] if one is already running.
    /// Returns the terminal status once the session concludes (DONE, FAIL,
    /// TIMEOUT, or NO_IMAGE_AVAILABLE).
    pub async fn update_firmware(
        self: &Arc<Self>,
        device: Arc<Device>,
        endpoint_id: u8,
        manufacturer_id: u16,
        image_type: u16,
        model: Option<&str>,
    ) -> Result<OtaStatus> {
        if self.sessions.contains_key(&device.ieee) {
            return Err(ZigbeeError::OtaSessionInProgress);
        }

        let image = {
            let images = self.images.lock().unwrap();
            images.find(manufacturer_id, image_type, model)
        };
        let Some(image) = image else {
            return Ok(OtaStatus::NoImageAvailable);
        };

        let (done_tx, done_rx) = oneshot::channel();
        let session = Arc::new(OtaSession {
            endpoint_id,
            status: Mutex::new(OtaStatus::WaitQuery),
            image: image.clone(),
            last_progress: Mutex::new(Instant::now()),
            done_tx: Mutex::new(Some(done_tx)),
        });
        self.sessions.insert(device.ieee, session.clone());

        let listener_handle = match self.register_handler(device.clone(), endpoint_id).await {
            Ok(handle) => handle,
            Err(err) => {
                self.sessions.remove(&device.ieee);
                return Err(err);
            }
        };

        self.send_image_notify(&device, endpoint_id, &image).await?;

        let watchdog = self.clone();
        let ieee = device.ieee;
        let stall_after = self.max_time_without_progress;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(stall_after).await;
                let Some(session) = watchdog.sessions.get(&ieee).map(|s| s.clone()) else { break };
                if session.last_progress.lock().unwrap().elapsed() >= stall_after {
                    session.finish(OtaStatus::Timeout);
                    break;
                }
            }
        });

        let status = done_rx.await.unwrap_or(OtaStatus::Timeout);
        self.sessions.remove(&device.ieee);
        self.unregister_handler(&device, endpoint_id, listener_handle).await;
        Ok(status)
    }

    async fn send_image_notify(&self, device: &Device, endpoint_id: u8, image: &OtaImage) -> Result<()> {
        let mut payload = vec![0x03u8, 100]; // payload_type=3 (jitter+mfg+type+version), query_jitter=100%
        image.manufacturer_id.serialize_to(&mut payload);
        image.image_type.serialize_to(&mut payload);
        image.file_version.serialize_to(&mut payload);
        send_zcl_reply(
            device,
            endpoint_id,
            crate::cluster::id::OTA,
            server_frame_control(),
            None,
            0,
            CMD_IMAGE_NOTIFY,
            payload,
        )
        .await
    }

    /// Register the single forwarding listener that dispatches inbound OTA
    /// cluster commands to whichever session is currently open for
    /// `device`. Looked up by ieee on every event rather than captured by
    /// value, since the session itself is replaced (DashMap entry swapped)
    /// when a new upgrade starts.
    async fn register_handler(self: &Arc<Self>, device: Arc<Device>, endpoint_id: u8) -> Result<ListenerHandle> {
        let endpoints = device.endpoints().await;
        let Some(ep) = endpoints.get(&endpoint_id) else {
            return Err(ZigbeeError::DeviceNotInitialized(device.ieee.to_string()));
        };
        let Some(ota_cluster) = ep.cluster(crate::cluster::id::OTA) else {
            return Err(ZigbeeError::InvalidResponse(crate::error::InvalidResponse::SchemaMismatch(
                "endpoint has no OTA cluster".into(),
            )));
        };

        let manager = self.clone();
        let ieee = device.ieee;
        let dev = device.clone();
        let handle = ota_cluster.add_listener(Arc::new(move |event: &ClusterEvent| {
            let ClusterEvent::ClusterCommandReceived { command_id, tsn, data } = event else { return };
            if !matches!(*command_id, CMD_QUERY_NEXT_IMAGE | CMD_IMAGE_BLOCK | CMD_UPGRADE_END) {
                return;
            }
            let Some(session) = manager.sessions.get(&ieee).map(|s| s.clone()) else { return };
            let dev = dev.clone();
            let tsn = *tsn;
            let command_id = *command_id;
            let data = data.clone();
            let block_size = manager.next_image_block_size;
            tokio::spawn(async move {
                handle_ota_command(dev, session, block_size, command_id, tsn, data).await;
            });
        }));

        Ok(handle)
    }

    async fn unregister_handler(&self, device: &Device, endpoint_id: u8, handle: ListenerHandle) {
        let endpoints = device.endpoints().await;
        if let Some(ota_cluster) = endpoints.get(&endpoint_id).and_then(|ep| ep.cluster(crate::cluster::id::OTA)) {
            ota_cluster.remove_listener(handle);
        }
    }
}

async fn handle_ota_command(
    device: Arc<Device>,
    session: Arc<OtaSession>,
    block_size: u8,
    command_id: u8,
    tsn: u8,
    data: Vec<u8>,
) {
    session.touch();
    let endpoint_id = session.endpoint_id;
    let image = session.image.clone();
    let result = match command_id {
        CMD_QUERY_NEXT_IMAGE => {
            match handle_query_next_image(&device, endpoint_id, &image, tsn, &data).await {
                Ok(true) => {
                    session.set_status(OtaStatus::Stream);
                    Ok(())
                }
                Ok(false) => {
                    session.finish(OtaStatus::NoImageAvailable);
                    Ok(())
                }
                Err(err) => Err(err),
            }
        }
        CMD_IMAGE_BLOCK => handle_image_block(&device, endpoint_id, &image, block_size, tsn, &data).await,
        CMD_UPGRADE_END => {
            let outcome = handle_upgrade_end(&device, endpoint_id, &image, tsn, &data).await;
            if outcome.is_ok() {
                session.finish(OtaStatus::Done);
            } else {
                session.finish(OtaStatus::Fail);
            }
            outcome
        }
        _ => Ok(()),
    };
    if let Err(err) = result {
        tracing::warn!(ieee = %device.ieee, error = %err, "OTA handler failed");
    }
}

/// Answers a `query_next_image` request and reports whether the device
/// should proceed into the block-transfer stream (spec.md §4.6/§8 scenario
/// 3: a device already at or past our file version is told
/// `NO_IMAGE_AVAILABLE` and the session ends there, not `Stream`).
async fn handle_query_next_image(
    device: &Device,
    endpoint_id: u8,
    image: &OtaImage,
    tsn: u8,
    data: &[u8],
) -> Result<bool> {
    let (_field_control, rest) = u8::deserialize(data)?;
    let (_manufacturer_code, rest) = u16::deserialize(rest)?;
    let (_image_type, rest) = u16::deserialize(rest)?;
    let (current_file_version, _rest) = u32::deserialize(rest)?;

    let should_update = image.should_update(current_file_version);
    let mut payload = Vec::new();
    if should_update {
        crate::zcl::foundation::Status::Known(crate::zcl::foundation::KnownStatus::Success)
            .serialize_to(&mut payload);
        image.manufacturer_id.serialize_to(&mut payload);
        image.image_type.serialize_to(&mut payload);
        image.file_version.serialize_to(&mut payload);
        (image.data.len() as u32).serialize_to(&mut payload);
    } else {
        crate::zcl::foundation::Status::Known(crate::zcl::foundation::KnownStatus::NoImageAvailable)
            .serialize_to(&mut payload);
    }

    send_zcl_reply(
        device,
        endpoint_id,
        crate::cluster::id::OTA,
        server_frame_control(),
        None,
        tsn,
        CMD_QUERY_NEXT_IMAGE_RESPONSE,
        payload,
    )
    .await?;
    Ok(should_update)
}

async fn handle_image_block(
    device: &Device,
    endpoint_id: u8,
    image: &OtaImage,
    block_size: u8,
    tsn: u8,
    data: &[u8],
) -> Result<()> {
    let (_field_control, rest) = u8::deserialize(data)?;
    let (_manufacturer_code, rest) = u16::deserialize(rest)?;
    let (_image_type, rest) = u16::deserialize(rest)?;
    let (file_version, rest) = u32::deserialize(rest)?;
    let (file_offset, rest) = u32::deserialize(rest)?;
    let (requested_size, _rest) = u8::deserialize(rest)?;

    let mut payload = Vec::new();
    if file_version != image.file_version {
        crate::zcl::foundation::Status::Known(crate::zcl::foundation::KnownStatus::Failure)
            .serialize_to(&mut payload);
    } else if file_offset as usize > image.data.len() {
        crate::zcl::foundation::Status::Known(crate::zcl::foundation::KnownStatus::MalformedCommand)
            .serialize_to(&mut payload);
    } else {
        let window = requested_size.min(block_size) as usize;
        let start = file_offset as usize;
        let end = (start + window).min(image.data.len());
        let slice = &image.data[start..end];

        crate::zcl::foundation::Status::Known(crate::zcl::foundation::KnownStatus::Success)
            .serialize_to(&mut payload);
        image.manufacturer_id.serialize_to(&mut payload);
        image.image_type.serialize_to(&mut payload);
        image.file_version.serialize_to(&mut payload);
        file_offset.serialize_to(&mut payload);
        (slice.len() as u8).serialize_to(&mut payload);
        payload.extend_from_slice(slice);
    }

    send_zcl_reply(
        device,
        endpoint_id,
        crate::cluster::id::OTA,
        server_frame_control(),
        None,
        tsn,
        CMD_IMAGE_BLOCK_RESPONSE,
        payload,
    )
    .await
}

async fn handle_upgrade_end(device: &Device, endpoint_id: u8, image: &OtaImage, tsn: u8, data: &[u8]) -> Result<()> {
    let (_status, rest) = u8::deserialize(data)?;
    let (_manufacturer_code, rest) = u16::deserialize(rest)?;
    let (_image_type, rest) = u16::deserialize(rest)?;
    let (_file_version, _rest) = u32::deserialize(rest)?;

    let mut payload = Vec::new();
    image.manufacturer_id.serialize_to(&mut payload);
    image.image_type.serialize_to(&mut payload);
    image.file_version.serialize_to(&mut payload);
    0u32.serialize_to(&mut payload); // current_time: unknown, zero per "no time source" fallback
    0u32.serialize_to(&mut payload); // upgrade_time: apply immediately

    send_zcl_reply(
        device,
        endpoint_id,
        crate::cluster::id::OTA,
        server_frame_control(),
        None,
        tsn,
        CMD_UPGRADE_END_RESPONSE,
        payload,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;

    use crate::listener::DynamicBoundedSemaphore;
    use crate::radio::{RadioDriver, RadioEvent, RadioHandle, ZigbeePacket};
    use crate::types::Nwk;

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

    fn query_next_image_args(current_file_version: u32) -> Vec<u8> {
        let mut data = Vec::new();
        0u8.serialize_to(&mut data); // field control
        0u16.serialize_to(&mut data); // manufacturer code (unused here)
        0u16.serialize_to(&mut data); // image type (unused here)
        current_file_version.serialize_to(&mut data);
        data
    }

    /// spec.md §4.6/§8 scenario 3: a device that already reports a file
    /// version at or past the server's image is told `NO_IMAGE_AVAILABLE`
    /// and the query does not advance the session into the streaming phase.
    #[tokio::test]
    async fn query_next_image_declines_when_device_is_up_to_date() {
        let device = test_device();
        let image = OtaImage { manufacturer_id: 0x1234, image_type: 1, file_version: 10, model: None, data: vec![1, 2, 3] };
        let should_update =
            handle_query_next_image(&device, 1, &image, 7, &query_next_image_args(10)).await.unwrap();
        assert!(!should_update);
    }

    #[tokio::test]
    async fn query_next_image_accepts_when_device_is_behind() {
        let device = test_device();
        let image = OtaImage { manufacturer_id: 0x1234, image_type: 1, file_version: 10, model: None, data: vec![1, 2, 3] };
        let should_update =
            handle_query_next_image(&device, 1, &image, 7, &query_next_image_args(5)).await.unwrap();
        assert!(should_update);
    }

    #[test]
    fn should_update_compares_file_versions() {
        let image = OtaImage { manufacturer_id: 0x1234, image_type: 1, file_version: 10, model: None, data: vec![] };
        assert!(image.should_update(5));
        assert!(!image.should_update(10));
        assert!(!image.should_update(11));
    }

    #[test]
    fn image_index_looks_up_by_composite_key() {
        let mut index = OtaImageIndex::new();
        index.insert(OtaImage {
            manufacturer_id: 0x1234,
            image_type: 1,
            file_version: 10,
            model: Some("bulb-a".into()),
            data: vec![1, 2, 3],
        });
        assert!(index.find(0x1234, 1, Some("bulb-a")).is_some());
        assert!(index.find(0x1234, 1, Some("bulb-b")).is_none());
        assert!(index.find(0x1234, 2, Some("bulb-a")).is_none());
    }
}
