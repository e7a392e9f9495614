//! Simulated telemetry exchange over a loopback link.
//!
//! Run with:
//!   cargo run --example telemetry
//!
//! One task plays the device firmware: it answers a text command with a
//! packet of typed readings. The host side sends the command and waits
//! for the reply by name.

use std::time::Duration;

use boardlink::packet::{MatchRule, PacketDevice, Payload, ScalarArray};
use boardlink::transport::loopback_pair;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (host_link, firmware_link) = loopback_pair();

    let host = PacketDevice::default();
    host.open(host_link)?;

    // "Firmware": waits for any text packet, replies with readings.
    let firmware = PacketDevice::default();
    firmware.open(firmware_link)?;
    let firmware_task = {
        let firmware = firmware.clone();
        tokio::spawn(async move {
            let cmd = firmware
                .recv_packet(Duration::from_secs(1))
                .await
                .expect("command should arrive");
            eprintln!("firmware received: {:?}", cmd);

            firmware
                .write_packet(&Payload::Array {
                    name: "adc".to_string(),
                    values: ScalarArray::U16(vec![512, 498, 505, 530]),
                })
                .expect("reply should send");
        })
    };

    host.write_packet(&Payload::Text("read adc".to_string()))?;

    let rule = MatchRule::AnyKey(vec!["adc".to_string()]);
    let reply = host.wait_for(&rule, Duration::from_secs(1)).await?;
    println!("host got: {}", reply.to_json());

    firmware_task.await?;
    Ok(())
}
