//! §8 scenario 3: CONNECT_PORTS for path `/a/b` requesting a server-side
//! conversion to `Vec3` via `ToVec3` creates both a conversion port and a
//! server port, and registers the connection handle in `server_port_map`.

mod support;

use std::sync::Arc;

use remote_port_protocol::registers::TypeRegisterEntry;
use remote_port_protocol::runtime::{dispatch, DispatchOutcome, RemoteRuntime};
use remote_port_protocol::types::{
    DynamicConnectorParameters, Handle, PortFlags, PortPath, ServerSideConversion, StaticConnectorParameters, Strategy,
};
use remote_port_protocol::wire::codec::Serialize;
use remote_port_protocol::wire::frame::RawMessage;
use remote_port_protocol::wire::messages::ConnectPorts;
use remote_port_protocol::wire::opcode::Opcode;

use support::{FakeGraph, FakeStructureLock};

#[tokio::test]
async fn connect_ports_with_server_side_conversion_creates_conversion_and_server_ports() {
    let host = Arc::new(FakeGraph::new());
    host.register(Handle(10), PortPath::local(vec!["a".into(), "b".into()]), PortFlags::default().with(PortFlags::SHARED), 7, Strategy::NONE);

    let lock = Arc::new(FakeStructureLock::default());
    let mut runtime = RemoteRuntime::new(host.clone(), lock);
    runtime.registers.insert_type(5, TypeRegisterEntry { name: "Vec3".into(), underlying_type: "struct".into(), element_type: None, enum_constants: vec![] });

    let request = ConnectPorts {
        handle: Handle(1),
        client_port_path: PortPath::local(vec!["a".into(), "b".into()]),
        static_parameters: StaticConnectorParameters {
            server_port_path: PortPath::local(vec!["a".into(), "b".into()]),
            server_side_conversion: Some(ServerSideConversion {
                operation_1: "ToVec3".into(),
                operation_1_parameter: String::new(),
                operation_2: String::new(),
                operation_2_parameter: String::new(),
                intermediate_type: String::new(),
                destination_type: "Vec3".into(),
            }),
            reverse_push: false,
        },
        dynamic_parameters: DynamicConnectorParameters { minimal_update_interval_ms: 50, high_priority: false, strategy: Strategy(1) },
        publish_connection: true,
        is_tool_connection: false,
    };
    let mut body = Vec::new();
    request.serialize(&mut body).unwrap();
    let message = RawMessage { opcode: Opcode::ConnectPorts, flags_byte: None, body };

    let ports_before = host.port_count();
    let outcome = dispatch(&mut runtime, message, None).await.unwrap();
    assert!(matches!(outcome, DispatchOutcome::Applied));

    // Both the conversion port and the server port mirroring it were created.
    assert_eq!(host.port_count(), ports_before + 2);

    let server_port = runtime.server_port_map.get(&Handle(1)).expect("connection handle registered");
    assert!(server_port.conversion_port.is_some());
    assert!(host.contains(server_port.local_port));
    assert!(host.contains(server_port.conversion_port.unwrap()));
}

#[tokio::test]
async fn connect_ports_rejects_an_already_occupied_handle() {
    let host = Arc::new(FakeGraph::new());
    host.register(Handle(10), PortPath::local(vec!["x".into()]), PortFlags::default(), 1, Strategy::NONE);
    let lock = Arc::new(FakeStructureLock::default());
    let mut runtime = RemoteRuntime::new(host.clone(), lock);

    let request = ConnectPorts {
        handle: Handle(1),
        client_port_path: PortPath::local(vec!["x".into()]),
        static_parameters: StaticConnectorParameters { server_port_path: PortPath::local(vec!["x".into()]), server_side_conversion: None, reverse_push: false },
        dynamic_parameters: DynamicConnectorParameters::default(),
        publish_connection: true,
        is_tool_connection: false,
    };
    let mut body = Vec::new();
    request.serialize(&mut body).unwrap();

    let first = dispatch(&mut runtime, RawMessage { opcode: Opcode::ConnectPorts, flags_byte: None, body: body.clone() }, None).await.unwrap();
    assert!(matches!(first, DispatchOutcome::Applied));

    let second = dispatch(&mut runtime, RawMessage { opcode: Opcode::ConnectPorts, flags_byte: None, body }, None).await.unwrap();
    assert!(matches!(second, DispatchOutcome::Rejected(_)));
}
