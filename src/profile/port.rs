//! Port detection for Node entry points
//!
//! Priority order: literal numeric assignment to a PORT-like identifier >
//! `.listen(<number>` call > `process.env.PORT || <default>` pattern. This is
//! optional enrichment: a miss never fails the pipeline.

/// Conventional fallback for entry points that open a socket without naming
/// a port literal anywhere.
pub const DEFAULT_PORT: u16 = 3000;

/// Scan entry-point source text for a declared port.
pub fn detect_port(source: &str) -> Option<u16> {
    literal_port_assignment(source)
        .or_else(|| listen_call_port(source))
        .or_else(|| env_default_port(source))
}

/// `const PORT = 8080`, `let serverPort = 3001`, `PORT: 9090`
fn literal_port_assignment(source: &str) -> Option<u16> {
    for line in source.lines() {
        let lower = line.to_ascii_lowercase();
        let Some(idx) = lower.find("port") else {
            continue;
        };
        let rest = line[idx + 4..].trim_start();
        let Some(rest) = rest.strip_prefix('=').or_else(|| rest.strip_prefix(':')) else {
            continue;
        };
        if let Some(port) = leading_number(rest.trim_start()) {
            return Some(port);
        }
    }
    None
}

/// `server.listen(8080, ...)`
fn listen_call_port(source: &str) -> Option<u16> {
    let mut rest = source;
    while let Some(idx) = rest.find(".listen(") {
        rest = &rest[idx + ".listen(".len()..];
        if let Some(port) = leading_number(rest.trim_start()) {
            return Some(port);
        }
    }
    None
}

/// `process.env.PORT || 5000` (also the `??` spelling)
fn env_default_port(source: &str) -> Option<u16> {
    for anchor in ["process.env.PORT", "process.env['PORT']"] {
        let mut rest = source;
        while let Some(idx) = rest.find(anchor) {
            rest = &rest[idx + anchor.len()..];
            let trimmed = rest.trim_start();
            for op in ["||", "??"] {
                if let Some(after) = trimmed.strip_prefix(op) {
                    if let Some(port) = leading_number(after.trim_start()) {
                        return Some(port);
                    }
                }
            }
        }
    }
    None
}

fn leading_number(s: &str) -> Option<u16> {
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    // Ports below 80 are almost certainly not what the author meant
    digits.parse::<u16>().ok().filter(|p| *p >= 80)
}
