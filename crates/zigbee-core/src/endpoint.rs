//! C6 — endpoint: the profile/device-id descriptor plus the live cluster
//! instances it owns.
//!
//! Grounded on `zigpy/endpoint.py` (`Status.NEW`/`Status.ZDO_INIT`,
//! `add_input_cluster`/`add_output_cluster`, `deserialize`/`handle_message`'s
//! report-attributes direction override), widened from a bare
//! profile_id/device_id/cluster-id-list record to a map of live `Cluster`
//! instances.

use std::collections::{HashMap, HashSet};

use crate::cluster::{Cluster, ClusterRole, ClusterTransport};
use crate::error::Result;
use crate::types::Wire;
use crate::zcl::foundation::{Attribute, GeneralCommand};
use crate::zcl::ZclHeader;
use crate::zdo::SimpleDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointStatus {
    New,
    Initialized,
}

/// What `Endpoint::handle_message` found, and what `Device` (C7) needs to do
/// next. Report-attributes frames are fully handled here and never touch
/// the per-device pending-request table — the direction override spec.md
/// §4.2 calls out: the command id's table entry marks it `server_to_client`
/// like a correlated response, but it is always an unsolicited push.
pub enum Dispatch {
    /// The attribute cache was updated and an `attribute_updated` event was
    /// emitted. `header` is handed back so the caller can send the
    /// default-response the report-attributes contract requires whenever
    /// `!header.frame_control.disable_default_response` (spec.md §4.2).
    ReportAttributesHandled { header: ZclHeader },
    /// Everything else: `Device` tries to resolve `header.tsn` against its
    /// pending-request table first; on a miss it calls back into
    /// [`Endpoint::dispatch_unsolicited`].
    Awaiting { header: ZclHeader, cluster_id: u16, payload: Vec<u8> },
}

pub struct Endpoint {
    pub endpoint_id: u8,
    pub profile_id: u16,
    pub device_id: u16,
    pub device_version: u8,
    pub status: EndpointStatus,
    input_clusters: HashMap<u16, Cluster>,
    output_clusters: HashMap<u16, Cluster>,
    group_membership: HashSet<u16>,
    pub model: Option<String>,
    pub manufacturer: Option<String>,
}

impl Endpoint {
    pub fn from_simple_descriptor(desc: &SimpleDescriptor) -> Self {
        let mut input_clusters = HashMap::new();
        for &id in &desc.input_clusters {
            input_clusters.insert(id, Cluster::from_id(desc.endpoint, id, ClusterRole::Server));
        }
        let mut output_clusters = HashMap::new();
        for &id in &desc.output_clusters {
            output_clusters.insert(id, Cluster::from_id(desc.endpoint, id, ClusterRole::Client));
        }
        Self {
            endpoint_id: desc.endpoint,
            profile_id: desc.profile,
            device_id: desc.device_type,
            device_version: desc.device_version,
            status: EndpointStatus::New,
            input_clusters,
            output_clusters,
            group_membership: HashSet::new(),
            model: None,
            manufacturer: None,
        }
    }

    pub fn cluster(&self, cluster_id: u16) -> Option<&Cluster> {
        self.input_clusters.get(&cluster_id).or_else(|| self.output_clusters.get(&cluster_id))
    }

    pub fn cluster_mut(&mut self, cluster_id: u16) -> Option<&mut Cluster> {
        if self.input_clusters.contains_key(&cluster_id) {
            self.input_clusters.get_mut(&cluster_id)
        } else {
            self.output_clusters.get_mut(&cluster_id)
        }
    }

    pub fn input_clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.input_clusters.values()
    }

    pub fn output_clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.output_clusters.values()
    }

    pub fn groups(&self) -> impl Iterator<Item = &u16> {
        self.group_membership.iter()
    }

    pub fn add_group(&mut self, group_id: u16) {
        self.group_membership.insert(group_id);
    }

    pub fn remove_group(&mut self, group_id: u16) {
        self.group_membership.remove(&group_id);
    }

    /// Discover `model`/`manufacturer` off the Basic cluster, if present
    /// (`zigpy.endpoint.Endpoint._initialize`, the tail of `Device`'s ZDO
    /// init sequence this endpoint is a part of). Tries the combined
    /// two-attribute read first; attributes that come back timed out are
    /// retried one at a time, since some devices choke on multi-attribute
    /// reads of the Basic cluster (spec.md §4.3).
    pub async fn initialize(&mut self, transport: &dyn ClusterTransport) -> Result<()> {
        if let Some(basic) = self.input_clusters.get_mut(&crate::cluster::id::BASIC) {
            let (values, failures) = basic
                .read_attributes(
                    &[
                        crate::cluster::AttrRef::Name("manufacturer"),
                        crate::cluster::AttrRef::Name("model"),
                    ],
                    false,
                    transport,
                )
                .await?;
            self.apply_basic_attributes(values);

            let timed_out: Vec<crate::cluster::AttrRef<'static>> = failures
                .into_iter()
                .filter(|(_, status)| {
                    matches!(
                        status,
                        crate::zcl::foundation::Status::Known(
                            crate::zcl::foundation::KnownStatus::Timeout
                        )
                    )
                })
                .filter_map(|(attr_id, _)| match attr_id {
                    0x0004 => Some(crate::cluster::AttrRef::Name("manufacturer")),
                    0x0005 => Some(crate::cluster::AttrRef::Name("model")),
                    _ => None,
                })
                .collect();

            for attr in timed_out {
                let basic = self.input_clusters.get_mut(&crate::cluster::id::BASIC).unwrap();
                let (values, _) = basic.read_attributes(&[attr], false, transport).await?;
                self.apply_basic_attributes(values);
            }
        }
        self.status = EndpointStatus::Initialized;
        Ok(())
    }

    fn apply_basic_attributes(&mut self, values: HashMap<u16, crate::zcl::foundation::AttributeValue>) {
        for (attr_id, value) in values {
            if let crate::zcl::foundation::AttributeValue::CharacterString(s) = value {
                if attr_id == 0x0004 {
                    self.manufacturer = Some(s.0);
                } else if attr_id == 0x0005 {
                    self.model = Some(s.0);
                }
            }
        }
    }

    /// Parse a ZCL frame addressed to this endpoint and decide what to do
    /// with it (spec.md §4.2 "inbound dispatch").
    pub fn deserialize_zcl(&self, data: &[u8]) -> Result<(ZclHeader, Vec<u8>)> {
        let (header, rest) = ZclHeader::deserialize(data)?;
        Ok((header, rest.to_vec()))
    }

    pub fn handle_message(&mut self, header: ZclHeader, cluster_id: u16, payload: Vec<u8>) -> Dispatch {
        let is_report_attributes = !header.frame_control.cluster_specific
            && GeneralCommand::from_u8(header.command_id) == Some(GeneralCommand::ReportAttributes);

        if is_report_attributes {
            if let Some(cluster) = self.cluster_mut(cluster_id) {
                let mut records = Vec::new();
                let mut rest = &payload[..];
                while !rest.is_empty() {
                    match Attribute::deserialize(rest) {
                        Ok((rec, r)) => {
                            records.push(rec);
                            rest = r;
                        }
                        Err(_) => break,
                    }
                }
                cluster.handle_report_attributes(records);
            }
            return Dispatch::ReportAttributesHandled { header };
        }

        Dispatch::Awaiting { header, cluster_id, payload }
    }

    /// Called by `Device` once it has confirmed `header.tsn` matched no
    /// pending request: forward the frame to the cluster as an
    /// asynchronous event (spec.md §4.4).
    pub fn dispatch_unsolicited(&self, header: &ZclHeader, cluster_id: u16, payload: Vec<u8>) {
        let Some(cluster) = self.cluster(cluster_id) else {
            return;
        };
        if header.frame_control.cluster_specific {
            cluster.handle_cluster_command(header.command_id, header.tsn, payload);
        } else {
            cluster.handle_unknown_cluster_message(header.command_id, header.tsn);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::cluster::id::BASIC;
    use crate::types::{CharacterString, Wire};
    use crate::zcl::foundation::{AttributeValue, KnownStatus, ReadAttributeRecord, Status};
    use crate::zcl::FrameControl;

    /// Times out a combined multi-attribute read once, then answers
    /// single-attribute reads for `manufacturer`/`model` with a value.
    struct TimeoutThenSingleAttrTransport {
        calls: AtomicUsize,
    }

    impl ClusterTransport for TimeoutThenSingleAttrTransport {
        fn send<'a>(
            &'a self,
            _endpoint_id: u8,
            _cluster_id: u16,
            _frame_control: FrameControl,
            _manufacturer_code: Option<u16>,
            _command_id: u8,
            payload: Vec<u8>,
            _expect_reply: bool,
        ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>>> + Send + 'a>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (ids, _) = crate::types::LvList::<u16>::deserialize(&payload).unwrap();
            Box::pin(async move {
                if ids.0.len() > 1 {
                    return Ok(None);
                }
                let attr_id = ids.0[0];
                let value = if attr_id == 0x0004 {
                    AttributeValue::CharacterString(CharacterString("acme".into()))
                } else {
                    AttributeValue::CharacterString(CharacterString("widget".into()))
                };
                let mut out = Vec::new();
                ReadAttributeRecord {
                    attrid: attr_id,
                    status: Status::Known(KnownStatus::Success),
                    value: Some(value),
                }
                .serialize_to(&mut out);
                Ok(Some(out))
            })
        }
    }

    #[tokio::test]
    async fn initialize_falls_back_to_single_attribute_reads_after_a_combined_timeout() {
        let mut ep = Endpoint::from_simple_descriptor(&SimpleDescriptor {
            endpoint: 1,
            profile: 0x0104,
            device_type: 0x0100,
            device_version: 1,
            input_clusters: vec![BASIC],
            output_clusters: vec![],
        });
        let transport = TimeoutThenSingleAttrTransport { calls: AtomicUsize::new(0) };

        ep.initialize(&transport).await.unwrap();

        assert_eq!(ep.manufacturer.as_deref(), Some("acme"));
        assert_eq!(ep.model.as_deref(), Some("widget"));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    fn basic_descriptor() -> SimpleDescriptor {
        SimpleDescriptor {
            endpoint: 1,
            profile: 0x0104,
            device_type: 0x0100,
            device_version: 1,
            input_clusters: vec![crate::cluster::id::BASIC, crate::cluster::id::ON_OFF],
            output_clusters: vec![],
        }
    }

    #[test]
    fn from_simple_descriptor_builds_both_cluster_maps() {
        let ep = Endpoint::from_simple_descriptor(&basic_descriptor());
        assert!(ep.cluster(crate::cluster::id::BASIC).is_some());
        assert!(ep.cluster(crate::cluster::id::ON_OFF).is_some());
        assert!(ep.cluster(0x1234).is_none());
    }

    #[test]
    fn report_attributes_is_handled_without_awaiting() {
        let mut ep = Endpoint::from_simple_descriptor(&basic_descriptor());
        let mut payload = Vec::new();
        Attribute {
            attrid: 0x0000,
            value: crate::zcl::foundation::TypeValue(
                crate::zcl::foundation::AttributeValue::Boolean(true),
            ),
        }
        .serialize_to(&mut payload);

        let header = ZclHeader {
            frame_control: crate::zcl::FrameControl {
                cluster_specific: false,
                manufacturer_specific: false,
                direction_server_to_client: true,
                disable_default_response: false,
            },
            manufacturer_code: None,
            tsn: 5,
            command_id: GeneralCommand::ReportAttributes as u8,
        };
        let outcome = ep.handle_message(header.clone(), crate::cluster::id::ON_OFF, payload);
        let Dispatch::ReportAttributesHandled { header: returned } = outcome else {
            panic!("expected ReportAttributesHandled");
        };
        assert_eq!(returned.tsn, header.tsn);
        assert_eq!(
            ep.cluster(crate::cluster::id::ON_OFF).unwrap().cached(0x0000),
            Some(&crate::zcl::foundation::AttributeValue::Boolean(true))
        );
    }

    #[test]
    fn non_report_commands_are_left_for_the_device_to_resolve() {
        let mut ep = Endpoint::from_simple_descriptor(&basic_descriptor());
        let header = ZclHeader {
            frame_control: crate::zcl::FrameControl {
                cluster_specific: true,
                manufacturer_specific: false,
                direction_server_to_client: true,
                disable_default_response: false,
            },
            manufacturer_code: None,
            tsn: 9,
            command_id: 0x00,
        };
        let outcome = ep.handle_message(header, crate::cluster::id::ON_OFF, vec![]);
        assert!(matches!(outcome, Dispatch::Awaiting { .. }));
    }
}
