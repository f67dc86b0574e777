//! End-to-end scenarios driving the full stack (Framer, Link Loop,
//! Protocol Engine, Request Facade) over an in-memory loopback channel
//! standing in for the VMC hardware.

use std::time::{Duration, Instant};

use vmc_driver::channel::ChannelPair;
use vmc_driver::config::Config;
use vmc_driver::controller::VendingMachineController;
use vmc_driver::protocol::command::cmd;
use vmc_driver::protocol::frame::{self, Frame, FrameDecoder};

/// Simulated VMC: reads whatever the driver wrote and decodes the next
/// complete frame, retrying until `timeout` elapses.
fn wait_for_frame(host: &mut ChannelPair, decoder: &mut FrameDecoder, timeout: Duration) -> Frame {
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(bytes) = host.read_available() {
            if !bytes.is_empty() {
                let frames = decoder.feed(&bytes);
                if let Some(frame) = frames.into_iter().next() {
                    return frame;
                }
            }
        }
        if Instant::now() >= deadline {
            panic!("timed out waiting for a frame from the driver");
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn send(host: &mut ChannelPair, command: u8, text: &[u8]) {
    host.write_all(&frame::encode(command, text).unwrap()).unwrap();
}

fn harness() -> (tokio::runtime::Runtime, VendingMachineController, ChannelPair) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut controller = VendingMachineController::new(Config::default());
    let (host, vmc) = ChannelPair::new_pair();
    controller.connect_with_channel(Box::new(vmc));
    (rt, controller, host)
}

#[test]
fn happy_path_dispense() {
    let (rt, mut controller, mut host) = harness();
    let facade = controller.facade();

    let task = rt.spawn(async move {
        facade.dispense(5, false, false, false, Duration::from_secs(2)).await.unwrap()
    });

    let mut decoder = FrameDecoder::new();
    send(&mut host, cmd::POLL, &[]);
    let select_buy = wait_for_frame(&mut host, &mut decoder, Duration::from_millis(500));
    assert_eq!(select_buy.command, cmd::SELECT_BUY);
    assert_eq!(select_buy.text[1..], [0x00, 0x05]); // aisle 5, big-endian

    send(&mut host, cmd::ACK, &[]);
    send(&mut host, cmd::DISPENSING_STATUS, &[select_buy.text[0], 0x02, 0x00, 0x05]);

    let response = rt.block_on(task).unwrap();
    assert!(response.success);
    assert_eq!(response.message, "Dispense successful");
    assert!(!response.transaction_id.is_empty());

    controller.disconnect();
}

#[test]
fn interim_dispensing_then_success_resolves_only_once() {
    let (rt, mut controller, mut host) = harness();
    let facade = controller.facade();

    let task = rt.spawn(async move {
        facade.dispense(5, false, false, false, Duration::from_secs(2)).await.unwrap()
    });

    let mut decoder = FrameDecoder::new();
    send(&mut host, cmd::POLL, &[]);
    let select_buy = wait_for_frame(&mut host, &mut decoder, Duration::from_millis(500));
    send(&mut host, cmd::ACK, &[]);

    let comm_num = select_buy.text[0];
    send(&mut host, cmd::DISPENSING_STATUS, &[comm_num, 0x01, 0x00, 0x05]); // DISPENSING
    std::thread::sleep(Duration::from_millis(30));
    assert!(!task.is_finished(), "DISPENSING must not resolve the facade");

    send(&mut host, cmd::DISPENSING_STATUS, &[comm_num, 0x02, 0x00, 0x05]); // SUCCESS
    let response = rt.block_on(task).unwrap();
    assert!(response.success);

    controller.disconnect();
}

#[test]
fn jam_is_reported_as_failure() {
    let (rt, mut controller, mut host) = harness();
    let facade = controller.facade();

    let task = rt.spawn(async move {
        facade.dispense(5, false, false, false, Duration::from_secs(2)).await.unwrap()
    });

    let mut decoder = FrameDecoder::new();
    send(&mut host, cmd::POLL, &[]);
    let select_buy = wait_for_frame(&mut host, &mut decoder, Duration::from_millis(500));
    send(&mut host, cmd::ACK, &[]);
    send(&mut host, cmd::DISPENSING_STATUS, &[select_buy.text[0], 0x03, 0x00, 0x05]); // JAMMED

    let response = rt.block_on(task).unwrap();
    assert!(!response.success);
    assert_eq!(response.message, "Product jammed");

    controller.disconnect();
}

#[test]
fn retry_exhaustion_surfaces_as_facade_timeout() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut config = Config::default();
    config.vmc_command_timeout_ms = 20;
    config.vmc_max_retries = 2;
    let mut controller = VendingMachineController::new(config);
    let (mut host, vmc) = ChannelPair::new_pair();
    controller.connect_with_channel(Box::new(vmc));
    let facade = controller.facade();

    let task = rt.spawn(async move {
        facade.dispense(5, false, false, false, Duration::from_millis(500)).await.unwrap()
    });

    // VMC never ACKs; just keep polling so the engine's retry bookkeeping advances.
    for _ in 0..20 {
        send(&mut host, cmd::POLL, &[]);
        std::thread::sleep(Duration::from_millis(15));
        let _ = host.read_available();
    }

    let response = rt.block_on(task).unwrap();
    assert!(!response.success);
    assert_eq!(response.message, "Operation timed out");

    controller.disconnect();
}

#[test]
fn resynchronisation_after_garbage_delivers_status_check() {
    let (rt, mut controller, mut host) = harness();
    let facade = controller.facade();

    let task = rt.spawn(async move {
        facade.check_aisle_status(5, Duration::from_secs(2)).await.unwrap()
    });

    let mut decoder = FrameDecoder::new();
    send(&mut host, cmd::POLL, &[]);
    let check_aisle = wait_for_frame(&mut host, &mut decoder, Duration::from_millis(500));
    assert_eq!(check_aisle.command, cmd::CHECK_AISLE);
    send(&mut host, cmd::ACK, &[]);

    let mut garbage_then_frame = vec![0xAA, 0xBB, 0xCC];
    garbage_then_frame.extend(frame::encode(cmd::AISLE_STATUS_RESPONSE, &[check_aisle.text[0], 0x01, 0x00, 0x05]).unwrap());
    host.write_all(&garbage_then_frame).unwrap();

    let response = rt.block_on(task).unwrap();
    assert_eq!(response.status, vmc_driver::protocol::types::AisleStatus::Sellable);

    controller.disconnect();
}

#[test]
fn status_check_for_nonexistent_aisle() {
    let (rt, mut controller, mut host) = harness();
    let facade = controller.facade();

    let task = rt.spawn(async move {
        facade.check_aisle_status(9999, Duration::from_secs(2)).await.unwrap()
    });

    let mut decoder = FrameDecoder::new();
    send(&mut host, cmd::POLL, &[]);
    let check_aisle = wait_for_frame(&mut host, &mut decoder, Duration::from_millis(500));
    assert_eq!(check_aisle.text[1..], [0x27, 0x0F]); // aisle 9999
    send(&mut host, cmd::ACK, &[]);
    send(&mut host, cmd::AISLE_STATUS_RESPONSE, &[check_aisle.text[0], 0x03, 0x27, 0x0F]); // DOESNT_EXIST

    let response = rt.block_on(task).unwrap();
    assert_eq!(response.aisle, 9999);
    assert_eq!(response.message, "Aisle does not exist");

    controller.disconnect();
}
