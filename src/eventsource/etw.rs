//! # ETW Provider Setup
//!
//! Subscribes to the kernel providers spec.md §6 lists (process,
//! image-load, tcp/ip, object-manager, virtual-alloc) and converts raw
//! ETW records into the crate's `Event` enum.
//!
//! Each provider's callback runs on ferrisetw's own trace-processing
//! thread (spec.md §5: "EventSource callbacks run on threads owned by
//! the subscription library") — parsing is kept cheap and the parsed
//! `Event` is pushed straight onto the sink so the calling thread is
//! never held up.

use log::warn;

use super::{EventSink, EventSource};
use crate::domain::{CoreError, Event, TcpIpKind};

/// Which kernel providers to subscribe to, mirroring the INI-loaded
/// `ETWProfile` toggles (spec.md §6).
#[derive(Debug, Clone, Copy)]
pub struct EtwProfile {
    pub watch_process_start: bool,
    pub watch_img_load: bool,
    pub watch_allocation: bool,
    pub watch_tcp_ip: bool,
    pub watch_obj_mgr: bool,
}

impl Default for EtwProfile {
    fn default() -> Self {
        EtwProfile {
            watch_process_start: true,
            watch_img_load: true,
            watch_allocation: true,
            watch_tcp_ip: true,
            watch_obj_mgr: true,
        }
    }
}

/// Production `EventSource`: owns an ETW kernel trace session for the
/// lifetime of `subscribe`.
pub struct EtwEventSource {
    pub profile: EtwProfile,
}

impl EtwEventSource {
    #[must_use]
    pub fn new(profile: EtwProfile) -> Self {
        EtwEventSource { profile }
    }
}

#[cfg(windows)]
impl EventSource for EtwEventSource {
    fn subscribe(self: Box<Self>, sink: EventSink) -> Result<(), CoreError> {
        use ferrisetw::parser::Parser;
        use ferrisetw::provider::kernel_providers::{
            IMAGE_LOAD_PROVIDER, PROCESS_PROVIDER, TCP_IP_PROVIDER, VIRTUAL_ALLOC_PROVIDER,
        };
        use ferrisetw::provider::Provider;
        use ferrisetw::trace::{KernelTrace, TraceTrait};
        use ferrisetw::EventRecord;
        use ferrisetw::SchemaLocator;

        let profile = self.profile;

        let process_sink = sink.clone();
        let process_cb = move |record: &EventRecord, schema_locator: &SchemaLocator| {
            if !profile.watch_process_start {
                return;
            }
            let Ok(schema) = schema_locator.event_schema(record) else { return };
            let parser = Parser::create(record, &schema);
            match record.opcode() {
                // Opcode 1 = process start, 2 = process stop (standard
                // kernel Process provider opcodes).
                1 => {
                    let pid = parser.try_parse::<u32>("ProcessId").unwrap_or(0);
                    let parent_pid = parser.try_parse::<u32>("ParentId").unwrap_or(0);
                    let image_file_name =
                        parser.try_parse::<String>("ImageFileName").unwrap_or_default();
                    let _ = process_sink.try_send(Event::ProcessStart {
                        pid: crate::domain::Pid(pid),
                        parent_pid: crate::domain::Pid(parent_pid),
                        image_file_name,
                    });
                }
                2 => {
                    let pid = parser.try_parse::<u32>("ProcessId").unwrap_or(0);
                    let _ = process_sink
                        .try_send(Event::ProcessStop { pid: crate::domain::Pid(pid) });
                }
                other => {
                    warn!("unhandled Process provider opcode: {other}");
                }
            }
        };

        let image_sink = sink.clone();
        let image_cb = move |record: &EventRecord, schema_locator: &SchemaLocator| {
            if !profile.watch_img_load {
                return;
            }
            let Ok(schema) = schema_locator.event_schema(record) else { return };
            let parser = Parser::create(record, &schema);
            let pid = parser.try_parse::<u32>("ProcessId").unwrap_or(0);
            let file_name = parser.try_parse::<String>("FileName").unwrap_or_default();
            let _ = image_sink.try_send(Event::ImageLoad {
                pid: crate::domain::Pid(pid),
                file_name,
            });
        };

        let tcp_sink = sink.clone();
        let tcp_cb = move |record: &EventRecord, schema_locator: &SchemaLocator| {
            if !profile.watch_tcp_ip {
                return;
            }
            let Ok(schema) = schema_locator.event_schema(record) else { return };
            let parser = Parser::create(record, &schema);
            let pid = parser.try_parse::<u32>("PID").unwrap_or(0);
            let kind = match record.opcode() {
                10 | 11 => TcpIpKind::Connect,
                12 | 13 => TcpIpKind::Accept,
                14 => TcpIpKind::Send,
                15 => TcpIpKind::Receive,
                _ => TcpIpKind::Send,
            };
            let _ = tcp_sink.try_send(Event::TcpIp { pid: crate::domain::Pid(pid), kind });
        };

        let alloc_sink = sink.clone();
        let alloc_cb = move |record: &EventRecord, schema_locator: &SchemaLocator| {
            if !profile.watch_allocation {
                return;
            }
            let Ok(schema) = schema_locator.event_schema(record) else { return };
            let parser = Parser::create(record, &schema);
            let pid = parser.try_parse::<u32>("ProcessId").unwrap_or(0);
            let base_address = parser.try_parse::<u64>("BaseAddress").unwrap_or(0);
            let _ = alloc_sink.try_send(Event::VirtualAlloc {
                pid: crate::domain::Pid(pid),
                base_address,
            });
        };

        let mut builder = KernelTrace::new().named("hollowwatch".to_owned());
        builder = builder.enable(Provider::kernel(&PROCESS_PROVIDER).add_callback(process_cb).build());
        builder =
            builder.enable(Provider::kernel(&IMAGE_LOAD_PROVIDER).add_callback(image_cb).build());
        builder = builder.enable(Provider::kernel(&TCP_IP_PROVIDER).add_callback(tcp_cb).build());
        builder = builder
            .enable(Provider::kernel(&VIRTUAL_ALLOC_PROVIDER).add_callback(alloc_cb).build());

        let trace = builder
            .start()
            .map_err(|e| CoreError::EventSourceInit(format!("ETW trace start failed: {e}")))?;

        // Object-manager handle-duplicate events are not part of the
        // classic NT Kernel Logger flag set ferrisetw's kernel_providers
        // module exposes; the real scanner pulls them from a separate
        // manifest-based user-session provider. That session setup is
        // kernel-trace-subscription plumbing spec.md places out of
        // scope, so `watch_obj_mgr` is accepted in the profile but has
        // no production source wired up here; `HandleDuplicate` stays
        // reachable through the `EventSource` trait for test doubles
        // and a future adapter.
        if profile.watch_obj_mgr {
            warn!("ETW profile enables WATCH_OBJ_MGR but no object-manager provider is wired up in this build");
        }

        // Blocks until the trace is stopped (process exit / explicit
        // stop), matching the trait's documented contract.
        trace.process()
            .map_err(|e| CoreError::EventSourceInit(format!("ETW trace processing failed: {e}")))?;
        Ok(())
    }
}

#[cfg(not(windows))]
impl EventSource for EtwEventSource {
    fn subscribe(self: Box<Self>, _sink: EventSink) -> Result<(), CoreError> {
        Err(CoreError::EventSourceInit(
            "ETW event source is only available on Windows".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_watches_everything() {
        let profile = EtwProfile::default();
        assert!(profile.watch_process_start);
        assert!(profile.watch_img_load);
        assert!(profile.watch_allocation);
        assert!(profile.watch_tcp_ip);
        assert!(profile.watch_obj_mgr);
    }
}
