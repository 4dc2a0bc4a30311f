//! Walk through a full operator session against a simulated robot.
//!
//! ```sh
//! cargo run -p botlink --example mock_session
//! ```

use std::sync::Arc;

use botlink::{BotEvent, ControllerBuilder, Instruction, format_packet_hex};
use botlink_test_harness::MockConnector;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let connector = MockConnector::new();
    let robot = connector.add_port("/dev/rfcomm0", "Bluetooth");
    robot.expect(&[3, 1, 3, 5], b"OK");

    let controller = Arc::new(ControllerBuilder::new().build(Box::new(connector)));
    let mut events = controller.subscribe_events();

    for port in controller.link().ports() {
        println!("found {port}");
    }
    let port = controller
        .link()
        .ports()
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("no ports"))?;
    controller.select_port(&port)?;

    for instruction in [Instruction::Forward, Instruction::Left, Instruction::Light] {
        controller.add_instruction(instruction)?;
    }

    let sent = controller.spawn_send().await??;
    let reply = controller.read_reply(2).await?;
    controller.disconnect().await;

    println!("sent {sent} bytes, reply {}", format_packet_hex(&reply));
    while let Ok(event) = events.try_recv() {
        match event {
            BotEvent::StateChanged { state, .. } => println!("status: {state}"),
            other => println!("event: {other:?}"),
        }
    }
    Ok(())
}
