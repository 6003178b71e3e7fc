use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Generate a participant id: base36 epoch millis followed by a 9 character
/// random base36 suffix.
///
/// Ids are compared as raw strings when electing the connection initiator,
/// so the format only has to be unique within a room, not meaningful.
pub fn new_participant_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{}{suffix}", to_base36(millis))
}

fn to_base36(mut value: u128) -> String {
    if value == 0 {
        return "0".into();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}
