//! Certificate-trust configuration blocks.
//!
//! When tunnel protection runs on certificates, every router needs a
//! trustpoint and a usable clock before enrollment can succeed. The
//! blocks below are inserted through [`splice_security_block`], the
//! single insertion point for post-render additions.

use chrono::{DateTime, Utc};
use std::fmt::Write;
use std::net::Ipv4Addr;

/// Name of the lab certificate authority trustpoint/server.
pub const CA_NAME: &str = "LAB-CA";

/// Insert `block` immediately before the last `end` marker of a
/// rendered configuration. A configuration without the marker gets the
/// block appended instead; enrollment still works, the device just
/// reads a slightly unusual file.
pub fn splice_security_block(rendered: &str, block: &str) -> String {
    let lines: Vec<&str> = rendered.lines().collect();
    let marker = lines.iter().rposition(|l| l.trim() == "end");
    let mut out = String::with_capacity(rendered.len() + block.len() + 2);
    match marker {
        Some(pos) => {
            for line in &lines[..pos] {
                out.push_str(line);
                out.push('\n');
            }
            out.push_str(block);
            if !block.ends_with('\n') {
                out.push('\n');
            }
            for line in &lines[pos..] {
                out.push_str(line);
                out.push('\n');
            }
        }
        None => {
            out.push_str(rendered);
            if !rendered.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(block);
            if !block.ends_with('\n') {
                out.push('\n');
            }
        }
    }
    out
}

/// One-shot boot-time clock bootstrap.
///
/// Certificate validity checks fail on a router that boots with its
/// default epoch clock. The applet waits 90 seconds for a time source;
/// if none has synchronized by then it sets the clock to the generation
/// timestamp and removes itself.
fn clock_bootstrap_applet(generated_at: DateTime<Utc>) -> String {
    let fallback = generated_at.format("%H:%M:%S %d %b %Y");
    format!(
        "event manager applet CLOCK-BOOTSTRAP\n\
         \x20event timer countdown time 90\n\
         \x20action 010 cli command \"enable\"\n\
         \x20action 020 cli command \"show ntp status\"\n\
         \x20action 030 string match \"*synchronized*\" \"$_cli_result\"\n\
         \x20action 040 if $_string_result eq \"0\"\n\
         \x20action 050  cli command \"clock set {fallback}\"\n\
         \x20action 060 end\n\
         \x20action 070 cli command \"configure terminal\"\n\
         \x20action 080 cli command \"no event manager applet CLOCK-BOOTSTRAP\"\n\
         \x20action 090 cli command \"end\"\n\
         !\n"
    )
}

/// Enrollment block for a non-CA router: RSA keypair, trustpoint
/// pointing at the CA's enrollment URL, clock bootstrap.
pub fn client_trust_block(
    hostname: &str,
    domain: &str,
    ca_address: Ipv4Addr,
    generated_at: DateTime<Utc>,
) -> String {
    let mut block = String::new();
    let _ = write!(
        block,
        "crypto key generate rsa modulus 2048 label {hostname}-PKI\n\
         crypto pki trustpoint {CA_NAME}\n\
         \x20enrollment url http://{ca_address}:80\n\
         \x20subject-name CN={hostname}.{domain}\n\
         \x20revocation-check none\n\
         \x20rsakeypair {hostname}-PKI\n\
         \x20auto-enroll 70\n\
         !\n"
    );
    block.push_str(&clock_bootstrap_applet(generated_at));
    block
}

/// Certificate-server activation block for the CA router: self-signed
/// root with automatic grant, plus the same clock bootstrap.
pub fn ca_server_block(domain: &str, generated_at: DateTime<Utc>) -> String {
    let mut block = String::new();
    let _ = write!(
        block,
        "crypto key generate rsa modulus 2048 label {CA_NAME}\n\
         crypto pki server {CA_NAME}\n\
         \x20database level minimum\n\
         \x20no database archive\n\
         \x20issuer-name CN={CA_NAME}.{domain}\n\
         \x20grant auto\n\
         \x20lifetime certificate 3650\n\
         \x20lifetime ca-certificate 3650\n\
         \x20no shutdown\n\
         !\n"
    );
    block.push_str(&clock_bootstrap_applet(generated_at));
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_splice_inserts_before_last_end_marker() {
        let rendered = "hostname R1\nend\nbanner\nend\n";
        let out = splice_security_block(rendered, "BLOCK\n");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines, vec!["hostname R1", "end", "banner", "BLOCK", "end"]);
    }

    #[test]
    fn test_splice_appends_when_marker_missing() {
        let rendered = "hostname R1\nno marker here\n";
        let out = splice_security_block(rendered, "BLOCK\n");
        assert!(out.ends_with("no marker here\nBLOCK\n"));
    }

    #[test]
    fn test_indented_end_counts_as_marker() {
        let rendered = "hostname R1\n end\n";
        let out = splice_security_block(rendered, "BLOCK\n");
        assert_eq!(out, "hostname R1\nBLOCK\n end\n");
    }

    #[test]
    fn test_client_block_carries_enrollment_url_and_fallback_clock() {
        let ts = Utc.with_ymd_and_hms(2026, 8, 23, 12, 0, 0).unwrap();
        let block = client_trust_block("R3", "virl.lab", "172.20.0.1".parse().unwrap(), ts);
        assert!(block.contains("enrollment url http://172.20.0.1:80"));
        assert!(block.contains("subject-name CN=R3.virl.lab"));
        assert!(block.contains("event timer countdown time 90"));
        assert!(block.contains("clock set 12:00:00 23 Aug 2026"));
    }

    #[test]
    fn test_ca_block_activates_certificate_server() {
        let ts = Utc.with_ymd_and_hms(2026, 8, 23, 12, 0, 0).unwrap();
        let block = ca_server_block("virl.lab", ts);
        assert!(block.contains("crypto pki server LAB-CA"));
        assert!(block.contains("grant auto"));
        assert!(block.contains("no shutdown"));
    }
}
