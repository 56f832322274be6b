//! Pre-flight topology validation.
//!
//! Every check here runs before the first node object is created, so a
//! rejected run leaves nothing behind on either backend. All checks are
//! pure functions of the synthesis parameters.

use crate::error::{Result, TopoError};

/// Physical port count of the virtual switches.
pub const SWITCH_PORTS: u32 = 32;

/// Node count above which controller licensing is at risk.
pub const LICENSE_NODE_CAP: u32 = 520;

/// Validate the flat-fabric shape and return the number of access
/// switches it needs.
///
/// Each access switch spends one port on the core uplink, so it can
/// carry `group_size` routers only if `group_size + 1` ports exist. The
/// core switch in turn needs one port per access switch.
pub fn validate_flat_topology(node_count: u32, group_size: u32) -> Result<u32> {
    if group_size == 0 {
        return Err(TopoError::Configuration(
            "group size must be at least 1".to_string(),
        ));
    }
    if group_size + 1 > SWITCH_PORTS {
        return Err(TopoError::Configuration(format!(
            "group size {} plus one uplink exceeds the {}-port switch capacity",
            group_size, SWITCH_PORTS
        )));
    }
    let num_access = node_count.div_ceil(group_size);
    if num_access > SWITCH_PORTS {
        return Err(TopoError::Configuration(format!(
            "{} nodes in groups of {} need {} access switches, more than the core switch's {} ports",
            node_count, group_size, num_access, SWITCH_PORTS
        )));
    }
    Ok(num_access)
}

/// Check that a pool has room for the addresses a run will draw.
pub fn check_pool_capacity(required: u64, available: u64, what: &str) -> Result<()> {
    if required > available {
        return Err(TopoError::Configuration(format!(
            "{} pool too small: need {} entries, have {}",
            what, required, available
        )));
    }
    Ok(())
}

/// Enforce the controller licensing soft cap unless the caller opted
/// out explicitly.
pub fn check_license_cap(node_count: u32, allow_oversubscribe: bool) -> Result<()> {
    if node_count > LICENSE_NODE_CAP && !allow_oversubscribe {
        return Err(TopoError::Configuration(format!(
            "{} nodes exceeds the licensing cap of {}; pass --allow-oversubscribe to proceed anyway",
            node_count, LICENSE_NODE_CAP
        )));
    }
    Ok(())
}
