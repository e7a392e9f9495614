//! Describe a firmware struct and move values through its binary image.
//!
//! Run with:
//!   cargo run --example struct-layouts

use boardlink::structs::{Layout, ScalarKind, StructValue, StructViewMut};
use serde_json::json;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Matches the packed C struct on the device:
    //   struct Reading { uint8_t channel; uint16_t raw; float volts; char tag[8]; };
    let reading = Layout::builder()
        .scalar("channel", ScalarKind::U8)
        .scalar("raw", ScalarKind::U16)
        .scalar("volts", ScalarKind::Float)
        .string("tag", 8)
        .build();
    println!("Reading is {} bytes", reading.size());

    let mut value = StructValue::new(&reading);
    value.set("channel", 3u8)?;
    value.set("raw", 1023u16)?;
    value.set("volts", 3.299f32)?;
    value.set("tag", "vbat")?;
    println!("image: {:02x?}", value.as_bytes());
    println!("tree:  {}", value.to_tree());

    // Partial merge leaves the other fields untouched.
    value.merge_tree(&json!({"raw": 512}))?;
    println!("after merge: {}", value.to_tree());

    // Zero-copy binding over caller-owned memory.
    let mut region = vec![0u8; reading.size()];
    let mut view = StructViewMut::new(&reading, &mut region)?;
    view.set("channel", 7u8)?;
    view.set("tag", "temp")?;
    println!("shared region: {:02x?}", region);

    Ok(())
}
