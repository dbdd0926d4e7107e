use notcl::{
    BridgeClient, BridgeServer, Error, PyExit, PyProcedureCall, TclHello, TclProcedureResult,
};
use std::fs::OpenOptions;
use std::thread;
use std::time::Duration;

fn server_with_client() -> (BridgeServer, thread::JoinHandle<notcl::Result<()>>) {
    let mut server = BridgeServer::open().unwrap();
    server.open_sentinel().unwrap();
    let client = BridgeClient::for_server(&server);
    let handle = thread::spawn(move || client.run());
    (server, handle)
}

#[test]
fn hello_echo_exit() {
    let (mut server, client) = server_with_client();

    let hello: TclHello = server.recv().unwrap();
    assert_eq!(hello.nameofexecutable(), "dummy_client");

    for (i, cmd) in ["abc", "Defgh", "Guten Tag"].iter().enumerate() {
        server.send(&PyProcedureCall::new(cmd)).unwrap();
        let reply: TclProcedureResult = server.recv().unwrap();
        assert_eq!(reply.err_code(), "0");
        assert_eq!(reply.result(), cmd.to_uppercase());
        assert_eq!(reply.cmd_idx(), i.to_string());
    }

    server.send(&PyExit::new("1")).unwrap();
    client.join().unwrap().unwrap();
}

#[test]
fn wrong_class_on_recv() {
    let (mut server, client) = server_with_client();

    // The first frame is a TclHello; reading it as a procedure result
    // must fail without breaking the alternation.
    let err = server.recv::<TclProcedureResult>().unwrap_err();
    assert!(matches!(err, Error::WrongMessageClass(_)));

    server.send(&PyExit::new("1")).unwrap();
    client.join().unwrap().unwrap();
}

#[test]
fn sentinel_eof_interrupts_recv() {
    let mut server = BridgeServer::open().unwrap();
    server.open_sentinel().unwrap();

    let sentinel_path = server.sentinel_path().to_path_buf();
    let child = thread::spawn(move || {
        let sentinel = OpenOptions::new().write(true).open(sentinel_path).unwrap();
        thread::sleep(Duration::from_millis(50));
        // "dies" without ever sending a message
        drop(sentinel);
    });

    let err = server.recv::<TclHello>().unwrap_err();
    assert!(matches!(err, Error::ChildEarlyExit));
    child.join().unwrap();
}

#[test]
fn sentinel_eof_interrupts_send() {
    let mut server = BridgeServer::open().unwrap();
    server.open_sentinel().unwrap();

    let client = BridgeClient::for_server(&server);
    let child = thread::spawn(move || {
        let sentinel = client.open_sentinel().unwrap();
        client
            .send(&TclHello::new("8.6-dummy", "", "", "doomed"))
            .unwrap();
        drop(sentinel);
    });

    let hello: TclHello = server.recv().unwrap();
    assert_eq!(hello.nameofexecutable(), "doomed");
    child.join().unwrap();

    // The client is gone; there is no reader to hand the frame to.
    let err = server.send(&PyProcedureCall::new("x")).unwrap_err();
    assert!(matches!(err, Error::ChildEarlyExit));
}

#[test]
fn alternation_is_enforced() {
    let (mut server, client) = server_with_client();

    // Fresh bridge expects the hello first.
    let err = server.send(&PyProcedureCall::new("x")).unwrap_err();
    assert!(matches!(err, Error::Precondition(_)));

    let _hello: TclHello = server.recv().unwrap();

    // Now a send is due, not another recv.
    let err = server.recv::<TclProcedureResult>().unwrap_err();
    assert!(matches!(err, Error::Precondition(_)));

    server.send(&PyExit::new("1")).unwrap();
    client.join().unwrap().unwrap();
}
