use std::sync::OnceLock;
use std::time::Instant;

pub struct Utils;

impl Utils {
    /// Milliseconds since the process first asked, on a monotonic clock.
    pub fn uptime_ms() -> u64 {
        static EPOCH: OnceLock<Instant> = OnceLock::new();
        EPOCH.get_or_init(Instant::now).elapsed().as_millis() as u64
    }

    /// `28 51 50 49 ...` style dump for the logs.
    pub fn hex(bytes: &[u8]) -> String {
        bytes
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Bytes as text, with anything unprintable shown as `.`
    pub fn ascii(bytes: &[u8]) -> String {
        bytes
            .iter()
            .map(|&b| {
                if b.is_ascii_graphic() || b == b' ' {
                    b as char
                } else {
                    '.'
                }
            })
            .collect()
    }

    // inverter fields arrive as zero padded text ("0414", "0042.1"); anything
    // that doesn't parse is treated as 0 rather than failing the record.
    pub fn lenient_f32(token: &str) -> f32 {
        token.trim().parse::<f32>().unwrap_or(0.0)
    }

    pub fn lenient_i32(token: &str) -> i32 {
        let token = token.trim();
        token
            .parse::<i32>()
            .or_else(|_| token.parse::<f32>().map(|f| f as i32))
            .unwrap_or(0)
    }

    /// Bit-field tokens are read as a plain decimal integer and cut down to
    /// the low byte, so `00000110` becomes 110 (0x6E).
    pub fn lenient_low_byte(token: &str) -> u8 {
        (Utils::lenient_i64(token) & 0xFF) as u8
    }

    fn lenient_i64(token: &str) -> i64 {
        token.trim().parse::<i64>().unwrap_or(0)
    }
}
