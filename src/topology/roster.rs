//! Roster: an ordered, named set of server identities participating in a
//! configuration (spec.md §3). Grounded on the teacher's `Identity` struct
//! (`types.rs`) — `name`, `networking_key`, `ws_routing`, `allowed_routers`
//! — generalized to the richer `ServerIdentity` the spec calls for
//! (per-service key pairs, external client URL).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

use crate::error::TopologyError;
use crate::ids::{PublicKey, RosterID, TreeNodeID};

/// `<conn>://<host>:<port>`, `conn in {tcp, tls, local}` (spec.md §6).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Scheme {
    Tcp,
    Tls,
    Local,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Scheme::Tcp => "tcp",
            Scheme::Tls => "tls",
            Scheme::Local => "local",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
}

impl Address {
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// A per-service additional key pair, carried on a `ServerIdentity` so that
/// a service can sign/verify independently of the node's default suite
/// (spec.md §4.8 key-pair discipline).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ServiceIdentity {
    pub service_name: String,
    pub public_key: PublicKey,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerIdentity {
    pub public_key: PublicKey,
    pub address: Address,
    pub external_url: Option<String>,
    pub description: String,
    pub service_identities: Vec<ServiceIdentity>,
}

impl ServerIdentity {
    pub fn new(public_key: PublicKey, address: Address) -> Self {
        Self {
            public_key,
            address,
            external_url: None,
            description: String::new(),
            service_identities: Vec::new(),
        }
    }

    /// `PublicKey -> TreeNodeID`; also used as the `ServerIdentityID` when
    /// resolving a `TreeMarshal` against a roster (spec.md §4.2).
    pub fn id(&self) -> TreeNodeID {
        self.public_key.tree_node_id()
    }

    pub fn service_public_key(&self, name: &str) -> Option<&PublicKey> {
        self.service_identities
            .iter()
            .find(|si| si.service_name == name)
            .map(|si| &si.public_key)
    }
}

impl PartialEq for ServerIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.public_key == other.public_key
    }
}
impl Eq for ServerIdentity {}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Roster {
    id: RosterID,
    pub list: Vec<ServerIdentity>,
}

impl Roster {
    /// Rejects empty input or a first entry with no public key
    /// (spec.md §4.2).
    pub fn new(list: Vec<ServerIdentity>) -> Result<Self, TopologyError> {
        if list.is_empty() {
            return Err(TopologyError::EmptyRoster);
        }
        if list[0].public_key.0.is_empty() {
            return Err(TopologyError::NoRootPublicKey);
        }
        let id = compute_roster_id(&list);
        Ok(Self { id, list })
    }

    pub fn get_id(&self) -> RosterID {
        self.id
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn search(&self, pk: &PublicKey) -> Option<usize> {
        self.list.iter().position(|si| &si.public_key == pk)
    }

    pub fn search_id(&self, id: TreeNodeID) -> Option<usize> {
        self.list.iter().position(|si| si.id() == id)
    }

    pub fn id_index_map(&self) -> HashMap<TreeNodeID, usize> {
        self.list
            .iter()
            .enumerate()
            .map(|(i, si)| (si.id(), i))
            .collect()
    }

    /// `NewRosterWithRoot`: swaps the given index to the front, preserving
    /// the relative order of everyone else, and recomputes the id. Does not
    /// mutate the caller's roster.
    pub fn with_root(&self, root_index: usize) -> Self {
        if root_index == 0 || root_index >= self.list.len() {
            return self.clone();
        }
        let mut list = self.list.clone();
        list.swap(0, root_index);
        let id = compute_roster_id(&list);
        Self { id, list }
    }
}

/// SHA-256 over packed public keys of all list entries and all per-service
/// public keys, in a deterministic order: service identities within one
/// entry are sorted by name before hashing so that reordering them does not
/// change the hash (spec.md §3 invariant (b)).
fn compute_roster_id(list: &[ServerIdentity]) -> RosterID {
    let mut hasher = Sha256::new();
    for si in list {
        hasher.update(&si.public_key.0);
        let mut services: Vec<&ServiceIdentity> = si.service_identities.iter().collect();
        services.sort_by(|a, b| a.service_name.cmp(&b.service_name));
        for svc in services {
            hasher.update(svc.service_name.as_bytes());
            hasher.update(&svc.public_key.0);
        }
    }
    let digest = hasher.finalize();
    RosterID(uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, &digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn si(byte: u8) -> ServerIdentity {
        ServerIdentity::new(
            PublicKey(vec![byte]),
            Address::new(Scheme::Tcp, "127.0.0.1", 7000 + byte as u16),
        )
    }

    #[test]
    fn empty_roster_rejected() {
        assert!(matches!(Roster::new(vec![]), Err(TopologyError::EmptyRoster)));
    }

    #[test]
    fn nil_first_key_rejected() {
        let bad = ServerIdentity::new(PublicKey(vec![]), Address::new(Scheme::Tcp, "h", 1));
        assert!(matches!(
            Roster::new(vec![bad]),
            Err(TopologyError::NoRootPublicKey)
        ));
    }

    #[test]
    fn roster_id_is_deterministic() {
        let list = vec![si(1), si(2), si(3)];
        let r1 = Roster::new(list.clone()).unwrap();
        let r2 = Roster::new(list).unwrap();
        assert_eq!(r1.get_id(), r2.get_id());
    }

    #[test]
    fn service_identity_order_does_not_change_roster_id() {
        let mut a = si(1);
        a.service_identities = vec![
            ServiceIdentity {
                service_name: "skipchain".into(),
                public_key: PublicKey(vec![10]),
            },
            ServiceIdentity {
                service_name: "cosi".into(),
                public_key: PublicKey(vec![11]),
            },
        ];
        let mut b = a.clone();
        b.service_identities.reverse();

        let r1 = Roster::new(vec![a, si(2)]).unwrap();
        let r2 = Roster::new(vec![b, si(2)]).unwrap();
        assert_eq!(r1.get_id(), r2.get_id());
    }
}
