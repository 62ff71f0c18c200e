//! Host and process statistics from `/proc` (Linux). Missing files yield `None`.

use std::fs;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SystemStats {
    pub mem_total_bytes: Option<u64>,
    pub mem_available_bytes: Option<u64>,
    pub process_rss_bytes: Option<u64>,
    pub load_avg: Option<(f64, f64, f64)>,
    pub cpu_count: Option<usize>,
}

impl SystemStats {
    pub fn collect() -> Self {
        let meminfo = fs::read_to_string("/proc/meminfo").unwrap_or_default();
        let status = fs::read_to_string("/proc/self/status").unwrap_or_default();
        let loadavg = fs::read_to_string("/proc/loadavg").unwrap_or_default();

        Self {
            mem_total_bytes: kib_field(&meminfo, "MemTotal:"),
            mem_available_bytes: kib_field(&meminfo, "MemAvailable:"),
            process_rss_bytes: kib_field(&status, "VmRSS:"),
            load_avg: parse_loadavg(&loadavg),
            cpu_count: std::thread::available_parallelism().ok().map(|n| n.get()),
        }
    }

    pub fn mem_used_percent(&self) -> Option<f64> {
        let total = self.mem_total_bytes? as f64;
        let avail = self.mem_available_bytes? as f64;
        if total <= 0.0 {
            return None;
        }
        Some(((total - avail) / total * 100.0).clamp(0.0, 100.0))
    }
}

/// `Key:   1234 kB` → bytes.
fn kib_field(text: &str, key: &str) -> Option<u64> {
    text.lines()
        .find_map(|line| line.strip_prefix(key))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|n| n.parse::<u64>().ok())
        .map(|kib| kib * 1024)
}

fn parse_loadavg(text: &str) -> Option<(f64, f64, f64)> {
    let mut it = text.split_whitespace().map(|s| s.parse::<f64>().ok());
    Some((it.next()??, it.next()??, it.next()??))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_meminfo_fields() {
        let meminfo = "MemTotal:       16000 kB\nMemFree:  100 kB\nMemAvailable:    4000 kB\n";
        assert_eq!(kib_field(meminfo, "MemTotal:"), Some(16000 * 1024));
        assert_eq!(kib_field(meminfo, "MemAvailable:"), Some(4000 * 1024));
        assert_eq!(kib_field(meminfo, "SwapTotal:"), None);

        let s = SystemStats {
            mem_total_bytes: Some(16000),
            mem_available_bytes: Some(4000),
            ..Default::default()
        };
        assert_eq!(s.mem_used_percent(), Some(75.0));
    }

    #[test]
    fn parses_loadavg() {
        assert_eq!(
            parse_loadavg("0.52 0.58 0.59 1/389 12345\n"),
            Some((0.52, 0.58, 0.59))
        );
        assert_eq!(parse_loadavg(""), None);
        assert_eq!(parse_loadavg("x y z"), None);
    }
}
