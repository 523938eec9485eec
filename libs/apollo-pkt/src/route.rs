use apollo_common::NodeId;
use apollo_common::Status;

pub type Port = u8;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum RouteClass {
    Local,
    Direct { mtu: usize },
    Gateway,
}

#[derive(Copy, Clone, Debug)]
pub struct NextHop {
    pub port: Port,
    pub next_node: NodeId,
    pub class: RouteClass,
}

/// What PKT needs from RIP to build a type-2 header: a next hop for a
/// routing key, used purely for the outbound decision. Kept as a trait so
/// `apollo-pkt` does not depend on `apollo-rip` (which itself sends via
/// PKT); `apollo-rip`'s routing table implements this.
pub trait RouteProvider: Send + Sync {
    fn find_nexthop(&self, routing_key: u32, node: NodeId) -> Option<NextHop>;
}

/// Validates `payload_len + template_len` against the route class's size
/// ceiling, per the builder's size-validation step.
pub fn validate_payload_size(
    class: RouteClass,
    template_len: usize,
    payload_len: usize,
) -> Result<(), Status> {
    if template_len + payload_len > 0x500 {
        return Err(Status::NETWORK_MESSAGE_HEADER_TOO_BIG);
    }
    let ceiling = match class {
        RouteClass::Local => 4096,
        RouteClass::Direct { mtu } => mtu,
        RouteClass::Gateway => 1024,
    };
    if payload_len > ceiling {
        return Err(Status::NETWORK_MESSAGE_HEADER_TOO_BIG);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_route_caps_payload_at_1kib() {
        assert!(validate_payload_size(RouteClass::Gateway, 0, 1024).is_ok());
        assert!(validate_payload_size(RouteClass::Gateway, 0, 1025).is_err());
    }

    #[test]
    fn compound_size_cap_applies_regardless_of_class() {
        assert!(validate_payload_size(RouteClass::Local, 0x400, 0x101).is_err());
    }
}
