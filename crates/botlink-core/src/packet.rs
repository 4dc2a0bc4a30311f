//! Packet encoding for instruction queues.
//!
//! The robot expects one packet per transmission:
//!
//! ```text
//! byte 0       : N, the number of instructions (0-255)
//! byte 1..=N   : wire code of each instruction, in queue order
//! ```
//!
//! There is no checksum, delimiter or escaping. The serial link delivers
//! bytes verbatim and in order.
//!
//! # Example
//!
//! ```
//! use botlink_core::packet::encode;
//! use botlink_core::Instruction;
//!
//! let packet = encode(&[Instruction::Forward, Instruction::Light]).unwrap();
//! assert_eq!(packet, vec![2, 1, 5]);
//! ```

use crate::error::{Error, Result};
use crate::instruction::Instruction;

/// Encode a queue snapshot into a packet.
///
/// An empty snapshot encodes to `[0]`, a valid no-op packet. Snapshots
/// longer than 255 instructions fail with [`Error::PacketTooLarge`]; the
/// queue enforces the same limit, but a snapshot may come from elsewhere.
pub fn encode(snapshot: &[Instruction]) -> Result<Vec<u8>> {
    let count = u8::try_from(snapshot.len()).map_err(|_| Error::PacketTooLarge(snapshot.len()))?;

    let mut packet = Vec::with_capacity(snapshot.len() + 1);
    packet.push(count);
    packet.extend(snapshot.iter().map(|instruction| instruction.wire_code()));
    Ok(packet)
}

/// Decode a packet back into instructions.
///
/// Used to inspect captured traffic. The buffer must hold exactly one
/// packet.
pub fn decode(packet: &[u8]) -> Result<Vec<Instruction>> {
    let (&count, codes) = packet
        .split_first()
        .ok_or_else(|| Error::Protocol("empty packet".into()))?;

    if codes.len() != count as usize {
        return Err(Error::Protocol(format!(
            "length prefix {} does not match {} instruction bytes",
            count,
            codes.len()
        )));
    }

    codes
        .iter()
        .map(|&code| {
            Instruction::from_wire_code(code)
                .ok_or_else(|| Error::Protocol(format!("unknown wire code 0x{code:02X}")))
        })
        .collect()
}
