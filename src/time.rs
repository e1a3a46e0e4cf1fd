use chrono::{DateTime, Utc};

/// Returns the current instant.
#[must_use]
pub fn timestamp() -> DateTime<Utc> {
    Utc::now()
}

// NOTE: Flip the sign bit so negative millis sort before positive ones
const SIGN: u64 = 1 << 63;

/// Encodes an instant as 8 big-endian bytes, preserving chronological order.
pub(crate) fn encode(instant: DateTime<Utc>) -> [u8; 8] {
    #[allow(clippy::cast_sign_loss)]
    let bits = instant.timestamp_millis() as u64 ^ SIGN;
    bits.to_be_bytes()
}

pub(crate) fn decode(bytes: [u8; 8]) -> crate::Result<DateTime<Utc>> {
    #[allow(clippy::cast_possible_wrap)]
    let millis = (u64::from_be_bytes(bytes) ^ SIGN) as i64;
    DateTime::from_timestamp_millis(millis).ok_or(crate::Error::Decode)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test_log::test]
    fn encoded_instants_sort_chronologically() {
        let instants = [
            Utc.with_ymd_and_hms(1901, 6, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(1969, 12, 31, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 2, 0, 0, 0).unwrap(),
        ];

        let encoded = instants.iter().map(|&x| encode(x)).collect::<Vec<_>>();

        let mut sorted = encoded.clone();
        sorted.sort();
        assert_eq!(encoded, sorted);

        for (bytes, instant) in encoded.into_iter().zip(instants) {
            assert_eq!(instant, decode(bytes).unwrap());
        }
    }
}
