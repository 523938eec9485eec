//! `DIR_$DO_OP`'s hint-iteration algorithm: gather route hints for the
//! target UID, try each in order, and fall back across remote-hop retry,
//! address-space exhaustion retry, and local-handler "stale, keep trying"
//! continuation.

use crate::opcode::{Opcode, CURRENT_VERSION};
use crate::wire::{DirRequest, DirResponse};
use apollo_common::{NodeId, Status};
use apollo_hint::HintCache;
use apollo_pkt::Port;
use std::collections::HashMap;

/// `ADD_$HARD_LINK`/`DELETE`/`DROP_HARD_LINK` retry with the same hint this
/// many times on `naming_ran_out_of_address_space` before giving up.
pub const MAX_ADDRESS_SPACE_RETRIES: u32 = 19;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum CallerKind {
    /// A distinguished server process: hint lookup is bypassed in favor of
    /// the single local hint `{node=NODE_ME, port=0}`.
    ServerProcess,
    Ordinary,
}

/// Sends a stamped request to a non-local hop and reports both the decoded
/// response and the wire version the remote end says it answered at.
pub trait RemoteFileSender: Send + Sync {
    fn send_request(&self, hop: (NodeId, Port), request: &DirRequest) -> Result<(DirResponse, u16), Status>;
}

/// One of the ~24 local directory operations.
pub trait LocalHandler: Send + Sync {
    fn handle(&self, request: &DirRequest) -> DirResponse;
}

fn is_retryable(status: Status) -> bool {
    status == Status::NETWORK_REMOTE_NODE_FAILED_TO_RESPOND
        || status == Status::NETWORK_COMMS_PROBLEM_WITH_REMOTE_NODE
        || status == Status::BAD_REPLY_RECEIVED_FROM_REMOTE_NODE
        || status == Status::DIR_STALE_ENTRY
}

/// Extracts a redirect's network-hint key from a `RESOLVE` response's data.
/// The original's exact redirect payload layout beyond "a different
/// low-20-bit UID" is not documented here; this crate reads it as a single
/// big-endian `u32` at the front of the response data, which is the
/// simplest shape consistent with the spec's description.
fn resolve_redirect_net_hint(response: &DirResponse) -> Option<u32> {
    if response.data.len() < 4 {
        return None;
    }
    Some(u32::from_be_bytes([response.data[0], response.data[1], response.data[2], response.data[3]]))
}

#[allow(clippy::too_many_arguments)]
pub fn dir_do_op(
    request: &DirRequest,
    caller: CallerKind,
    node_me: NodeId,
    hints: &HintCache,
    remote: &dyn RemoteFileSender,
    locals: &HashMap<Opcode, Box<dyn LocalHandler>>,
    audit: Option<&dyn Fn(&DirRequest, &DirResponse)>,
) -> DirResponse {
    let hint_list: Vec<(NodeId, Port)> = match caller {
        CallerKind::ServerProcess => vec![(node_me, 0)],
        CallerKind::Ordinary => hints.get_hints(request.uid),
    };

    let mut fallback_status = Status::FILE_NOT_FOUND;
    let last_index = hint_list.len().saturating_sub(1);

    for (index, &(hop_node, hop_port)) in hint_list.iter().enumerate() {
        let is_first = index == 0;

        if hop_node != node_me {
            match remote_hop(request, (hop_node, hop_port), remote) {
                RemoteOutcome::Success(response) => {
                    if !is_first {
                        hints.add_hint(request.uid, hop_node, hop_port);
                    }
                    if request.opcode == Opcode::Resolve && response.loop_flag {
                        if let Some(net_hint) = resolve_redirect_net_hint(&response) {
                            hints.add_net(net_hint, hop_node, hop_port);
                        }
                        return response;
                    }
                    return response;
                }
                RemoteOutcome::Retryable(status) => {
                    fallback_status = status;
                    continue;
                }
                RemoteOutcome::Terminal(response) => return response,
            }
        } else {
            let handler = match locals.get(&request.opcode) {
                Some(h) => h,
                None => {
                    fallback_status = Status::FILE_NOT_FOUND;
                    continue;
                }
            };
            let response = handler.handle(request);
            if let Some(audit_fn) = audit {
                audit_fn(request, &response);
            }
            if response.status.is_ok() {
                if !is_first {
                    hints.add_hint(request.uid, hop_node, hop_port);
                }
                return response;
            }
            // The distilled spec both forces a server-process caller down to
            // a single hint and separately says a stale entry should
            // continue to the next hint "if the caller is a server
            // process" -- those two clauses can't both hold for the same
            // caller kind at once, so this continuation is gated only on
            // hints remaining, not on caller kind.
            if response.status == Status::DIR_STALE_ENTRY && index < last_index {
                fallback_status = response.status;
                continue;
            }
            return response;
        }
    }

    DirResponse::failed(fallback_status)
}

enum RemoteOutcome {
    Success(DirResponse),
    Retryable(Status),
    Terminal(DirResponse),
}

fn remote_hop(request: &DirRequest, hop: (NodeId, Port), remote: &dyn RemoteFileSender) -> RemoteOutcome {
    let stamped = request.stamped(CURRENT_VERSION);
    let mut attempts = 0u32;
    loop {
        match remote.send_request(hop, &stamped) {
            Ok((response, remote_version)) => {
                if response.status.is_ok() {
                    let min_v = request.opcode.min_version();
                    // Preserved verbatim from the original's `resp_ver > 0 ||
                    // resp_ver < min_version` check: a strictly-positive
                    // version never appears in a successful reply on the
                    // wire this dispatcher talks to, so this looks
                    // asymmetric but is not "fixed" to `> CURRENT_VERSION`.
                    if remote_version > 0 || remote_version < min_v {
                        return RemoteOutcome::Retryable(Status::BAD_REPLY_RECEIVED_FROM_REMOTE_NODE);
                    }
                    return RemoteOutcome::Success(response);
                }
                if response.status == Status::NAMING_RAN_OUT_OF_ADDRESS_SPACE {
                    attempts += 1;
                    if attempts >= MAX_ADDRESS_SPACE_RETRIES {
                        return RemoteOutcome::Retryable(response.status);
                    }
                    continue;
                }
                if is_retryable(response.status) {
                    return RemoteOutcome::Retryable(response.status);
                }
                return RemoteOutcome::Terminal(response);
            }
            Err(status) => {
                if is_retryable(status) {
                    return RemoteOutcome::Retryable(status);
                }
                return RemoteOutcome::Terminal(DirResponse::failed(status));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apollo_common::Uid;

    struct FixedLocal(DirResponse);
    impl LocalHandler for FixedLocal {
        fn handle(&self, _request: &DirRequest) -> DirResponse {
            self.0.clone()
        }
    }

    struct NoRemote;
    impl RemoteFileSender for NoRemote {
        fn send_request(&self, _hop: (NodeId, Port), _request: &DirRequest) -> Result<(DirResponse, u16), Status> {
            Err(Status::NETWORK_REMOTE_NODE_FAILED_TO_RESPOND)
        }
    }

    #[test]
    fn server_process_caller_uses_the_single_local_hint() {
        let mut locals: HashMap<Opcode, Box<dyn LocalHandler>> = HashMap::new();
        locals.insert(Opcode::Add, Box::new(FixedLocal(DirResponse::ok(vec![]))));
        let hints = HintCache::new();
        let remote = NoRemote;

        let req = DirRequest::new(Opcode::Add, Uid::new(1, 1), vec![]);
        let resp = dir_do_op(&req, CallerKind::ServerProcess, 7, &hints, &remote, &locals, None);
        assert!(resp.status.is_ok());
    }

    #[test]
    fn stale_entry_on_the_first_hint_continues_to_the_next_hint() {
        let node_me: NodeId = 999;
        let hints = HintCache::new();
        let uid = Uid::new(1, 1);
        // add_hint promotes to head, so adding 50 then node_me puts node_me first.
        hints.add_hint(uid, 50, 0);
        hints.add_hint(uid, node_me, 0);

        let mut locals: HashMap<Opcode, Box<dyn LocalHandler>> = HashMap::new();
        locals.insert(Opcode::Add, Box::new(FixedLocal(DirResponse::failed(Status::DIR_STALE_ENTRY))));

        struct SucceedingRemote;
        impl RemoteFileSender for SucceedingRemote {
            fn send_request(&self, _hop: (NodeId, Port), _request: &DirRequest) -> Result<(DirResponse, u16), Status> {
                // A real reply's version is 0; see the `remote_version > 0`
                // check in `remote_hop`.
                Ok((DirResponse::ok(vec![42]), 0))
            }
        }
        let remote = SucceedingRemote;

        let req = DirRequest::new(Opcode::Add, uid, vec![]);
        let resp = dir_do_op(&req, CallerKind::Ordinary, node_me, &hints, &remote, &locals, None);
        assert!(resp.status.is_ok());
        assert_eq!(resp.data, vec![42]);
    }

    #[test]
    fn missing_local_handler_falls_back_to_file_not_found() {
        let hints = HintCache::new();
        let locals: HashMap<Opcode, Box<dyn LocalHandler>> = HashMap::new();
        let remote = NoRemote;
        let req = DirRequest::new(Opcode::Mount, Uid::new(2, 2), vec![]);
        let resp = dir_do_op(&req, CallerKind::ServerProcess, 1, &hints, &remote, &locals, None);
        assert_eq!(resp.status, Status::FILE_NOT_FOUND);
    }

    #[test]
    fn successful_non_first_hint_promotes_via_add_hint() {
        let hints = HintCache::new();
        let uid = Uid::new(3, 3);
        hints.add_hint(uid, 50, 0);
        hints.add_hint(uid, 60, 0); // head order is now [60, 50]
        let locals: HashMap<Opcode, Box<dyn LocalHandler>> = HashMap::new();

        struct FlakyRemote;
        impl RemoteFileSender for FlakyRemote {
            fn send_request(&self, hop: (NodeId, Port), _request: &DirRequest) -> Result<(DirResponse, u16), Status> {
                if hop.0 == 60 {
                    Err(Status::NETWORK_REMOTE_NODE_FAILED_TO_RESPOND)
                } else {
                    Ok((DirResponse::ok(vec![]), 0))
                }
            }
        }
        let remote = FlakyRemote;
        let req = DirRequest::new(Opcode::Add, uid, vec![]);
        let resp = dir_do_op(&req, CallerKind::Ordinary, 1, &hints, &remote, &locals, None);
        assert!(resp.status.is_ok());
        // 50 answered on a non-first try and must be promoted to the head.
        assert_eq!(hints.get_hints(uid)[0], (50, 0));
    }
}
