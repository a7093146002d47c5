/// Hostname and root-domain extraction used for dedupe and domain locking
use url::Url;

/// Extract the registrable ("root") domain from a URL
///
/// Algorithm:
/// 1. Parse URL to extract hostname
/// 2. Split hostname by "."
/// 3. If there are more than two labels, keep the last two
/// 4. If the TLD is 2 letters AND the second-level label is 2 letters or "com":
///    → keep the last three instead (e.g., "bbc.co.uk", "example.com.au")
/// 5. localhost and IP addresses are returned unchanged
///
/// Examples:
/// - https://www.bbc.co.uk/ → bbc.co.uk
/// - https://ssorallen.github.io/react-todos/ → github.io
/// - http://www.diy.guru/ → diy.guru
pub fn extract_root_domain(url: &str) -> Option<String> {
    let hostname = extract_hostname(url)?;

    if hostname == "localhost" || is_ip_address(&hostname) {
        return Some(hostname);
    }

    let parts: Vec<&str> = hostname.split('.').collect();
    if parts.len() <= 2 {
        return Some(hostname);
    }

    let tld = parts[parts.len() - 1];
    let second = parts[parts.len() - 2];
    let num_parts = if tld.len() == 2 && (second.len() == 2 || second == "com") {
        3
    } else {
        2
    };

    Some(parts[parts.len() - num_parts..].join("."))
}

/// Extract the lowercased hostname from a URL string
///
/// Falls back to manual splitting for inputs `Url` refuses, such as bare
/// hostnames without a scheme.
pub fn extract_hostname(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    if let Ok(parsed) = Url::parse(url) {
        if let Some(host) = parsed.host_str() {
            return Some(host.trim_start_matches('[').trim_end_matches(']').to_lowercase());
        }
        // Hostless schemes ("about:blank") and "https://" with nothing after it
        if parsed.cannot_be_a_base() {
            return None;
        }
    }

    let without_scheme = match url.find("://") {
        Some(pos) => &url[pos + 3..],
        None => url,
    };

    // Everything before the first '/', minus credentials and port
    let host_with_port = without_scheme.split(['/', '?', '#']).next()?;
    let host_with_port = host_with_port.rsplit('@').next()?;
    let hostname = host_with_port.split(':').next()?.to_lowercase();

    if hostname.is_empty() {
        None
    } else {
        Some(hostname)
    }
}

/// Check if a string looks like an IPv4 address
fn is_ip_address(s: &str) -> bool {
    s.chars().next().is_some_and(|c| c.is_ascii_digit())
        && s.chars().all(|c| c.is_ascii_digit() || c == '.')
}
