//! CA record model: the data object the rotation engine reads and rewrites.
//!
//! A record is cloned, mutated, and handed back to the store as both the
//! CAS witness (the pre-mutation clone) and the write (the mutated clone).
//! Nothing in this module performs I/O.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// Which trust root a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaType {
    /// Host identity trust root.
    HostCA,
    /// User identity trust root.
    UserCA,
}

impl CaType {
    /// Both CA types, host before user — the fan-out order the driver and
    /// auto loop use.
    #[must_use]
    pub const fn all() -> [Self; 2] {
        [Self::HostCA, Self::UserCA]
    }

    /// Parses a CA type from its wire name, treating an empty string as
    /// "not specified" rather than an error; callers expand that case
    /// themselves.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadParameter`] if `s` is non-empty and not a known
    /// CA type.
    pub fn parse_optional(s: &str) -> Result<Option<Self>> {
        match s {
            "" => Ok(None),
            "HostCA" => Ok(Some(Self::HostCA)),
            "UserCA" => Ok(Some(Self::UserCA)),
            other => Err(Error::BadParameter(format!(
                "unsupported certificate authority type: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for CaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HostCA => write!(f, "HostCA"),
            Self::UserCA => write!(f, "UserCA"),
        }
    }
}

/// Overall rotation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotationState {
    /// No rotation in progress.
    Standby,
    /// A rotation is underway.
    InProgress,
}

/// The rotation's current waypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotationPhase {
    /// No rotation underway.
    Standby,
    /// New credentials issued; clients may begin trusting and using them.
    UpdateClients,
    /// Servers are being signaled to reload and present new credentials.
    UpdateServers,
    /// A rotation is being reversed.
    Rollback,
}

impl std::fmt::Display for RotationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Standby => "Standby",
            Self::UpdateClients => "UpdateClients",
            Self::UpdateServers => "UpdateServers",
            Self::Rollback => "Rollback",
        };
        write!(f, "{s}")
    }
}

/// Who is driving the rotation forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotationMode {
    /// An operator advances each phase explicitly.
    Manual,
    /// The auto-rotation loop advances phases against the schedule.
    Auto,
}

/// Three wall-clock deadlines: the latest acceptable time to still be in
/// the phase named by the field before it, i.e. the time by which the next
/// phase must have started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationSchedule {
    /// Deadline for entering `UpdateClients` (informational; that
    /// transition is driven by the request, not the schedule).
    pub update_clients: DateTime<Utc>,
    /// Deadline for entering `UpdateServers`.
    pub update_servers: DateTime<Utc>,
    /// Deadline for returning to `Standby`.
    pub standby: DateTime<Utc>,
}

impl RotationSchedule {
    /// Builds an evenly split schedule: three deadlines at `started +
    /// grace/3`, `started + 2*grace/3`, `started + grace`.
    #[must_use]
    pub fn even_split(started: DateTime<Utc>, grace_period: Duration) -> Self {
        let third = grace_period / 3;
        Self {
            update_clients: started + third,
            update_servers: started + third * 2,
            standby: started + grace_period,
        }
    }
}

/// Rotation bookkeeping carried alongside the key material it governs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationDescriptor {
    /// Current overall state.
    pub state: RotationState,
    /// Current phase.
    pub phase: RotationPhase,
    /// Who is driving the rotation; absent in Standby.
    pub mode: Option<RotationMode>,
    /// Opaque identifier for the current rotation attempt; absent in
    /// Standby.
    pub current_id: Option<Uuid>,
    /// When the current rotation attempt started; absent in Standby.
    pub started: Option<DateTime<Utc>>,
    /// When the last rotation completed, if any.
    pub last_rotated: Option<DateTime<Utc>>,
    /// Total wall-clock budget for the current rotation attempt; absent in
    /// Standby.
    pub grace_period: Option<Duration>,
    /// Phase deadlines for the current rotation attempt; absent in
    /// Standby.
    pub schedule: Option<RotationSchedule>,
}

impl RotationDescriptor {
    /// The descriptor of a CA that has never rotated.
    #[must_use]
    pub const fn standby() -> Self {
        Self {
            state: RotationState::Standby,
            phase: RotationPhase::Standby,
            mode: None,
            current_id: None,
            started: None,
            last_rotated: None,
            grace_period: None,
            schedule: None,
        }
    }
}

impl Default for RotationDescriptor {
    fn default() -> Self {
        Self::standby()
    }
}

/// An SSH keypair in PEM encoding.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SshKeyPair {
    /// PEM-encoded private key.
    pub private_pem: String,
    /// PEM-encoded public key.
    pub public_pem: String,
}

impl std::fmt::Debug for SshKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshKeyPair")
            .field("private_pem", &"[REDACTED]")
            .field("public_pem", &self.public_pem)
            .finish()
    }
}

/// A TLS certificate, optionally paired with its private key.
///
/// During rollback the new certificate is retained trusted-but-not-signing:
/// the cert is kept and the key is dropped.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct TlsKeyPair {
    /// PEM-encoded certificate. Always present.
    pub cert_pem: String,
    /// PEM-encoded private key, if this entry can still sign.
    pub key_pem: Option<String>,
}

impl TlsKeyPair {
    /// Returns a copy of this pair with the private key stripped.
    #[must_use]
    pub fn into_trusted_only(mut self) -> Self {
        self.key_pem = None;
        self
    }
}

impl std::fmt::Debug for TlsKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsKeyPair")
            .field("cert_pem", &self.cert_pem)
            .field(
                "key_pem",
                &self.key_pem.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Ordered SSH signing (private) keys; index 0 is active, index 1 (when
/// present) is the retired key still trusted during a rotation.
///
/// Wrapped in its own type rather than a bare `Vec<String>` so the whole
/// sequence zeroizes on drop and redacts under `Debug`, the same treatment
/// [`SshKeyPair`] and [`TlsKeyPair`] give their own private halves.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SigningKeys(pub Vec<String>);

impl std::ops::Deref for SigningKeys {
    type Target = Vec<String>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::ops::DerefMut for SigningKeys {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl std::ops::Index<usize> for SigningKeys {
    type Output = String;

    fn index(&self, index: usize) -> &String {
        &self.0[index]
    }
}

impl std::ops::IndexMut<usize> for SigningKeys {
    fn index_mut(&mut self, index: usize) -> &mut String {
        &mut self.0[index]
    }
}

impl std::fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SigningKeys")
            .field(&format!("[REDACTED; {} key(s)]", self.0.len()))
            .finish()
    }
}

/// A cluster CA's full record: active/trusted key sets plus the rotation
/// descriptor that governs how they change.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaRecord {
    /// Which trust root this is.
    pub ca_type: CaType,
    /// Opaque cluster identifier.
    pub cluster_name: String,
    /// Ordered SSH signing (private) keys; index 0 is active.
    pub signing_keys: SigningKeys,
    /// Ordered SSH checking (public) keys, parallel to `signing_keys`.
    pub checking_keys: Vec<String>,
    /// Ordered TLS key pairs; index 0 is active.
    pub tls_key_pairs: Vec<TlsKeyPair>,
    /// Rotation bookkeeping.
    pub rotation: RotationDescriptor,
}

impl std::fmt::Debug for CaRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaRecord")
            .field("ca_type", &self.ca_type)
            .field("cluster_name", &self.cluster_name)
            .field("signing_keys", &self.signing_keys)
            .field("checking_keys", &self.checking_keys)
            .field("tls_key_pairs", &self.tls_key_pairs)
            .field("rotation", &self.rotation)
            .finish()
    }
}

impl CaRecord {
    /// Creates the initial record for a freshly bootstrapped CA: a single
    /// active key set and a standby rotation descriptor.
    #[must_use]
    pub fn bootstrap(
        ca_type: CaType,
        cluster_name: impl Into<String>,
        signing_key: String,
        checking_key: String,
        tls_pair: TlsKeyPair,
    ) -> Self {
        Self {
            ca_type,
            cluster_name: cluster_name.into(),
            signing_keys: SigningKeys(vec![signing_key]),
            checking_keys: vec![checking_key],
            tls_key_pairs: vec![tls_pair],
            rotation: RotationDescriptor::standby(),
        }
    }

    /// Checks the shape invariants that should hold for any reachable
    /// state. Intended for tests and defensive assertions, not production
    /// control flow.
    #[must_use]
    pub fn check_invariants(&self) -> bool {
        if self.signing_keys.len() != self.checking_keys.len() || self.signing_keys.is_empty() {
            return false;
        }
        if self.tls_key_pairs.is_empty() {
            return false;
        }
        match self.rotation.state {
            RotationState::Standby => {
                self.signing_keys.len() == 1
                    && self.rotation.phase == RotationPhase::Standby
                    && self.rotation.mode.is_none()
                    && self.rotation.started.is_none()
                    && self.rotation.schedule.is_none()
            }
            RotationState::InProgress => {
                self.signing_keys.len() == 2
                    && matches!(
                        self.rotation.phase,
                        RotationPhase::UpdateClients
                            | RotationPhase::UpdateServers
                            | RotationPhase::Rollback
                    )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tls_pair(n: &str) -> TlsKeyPair {
        TlsKeyPair {
            cert_pem: format!("cert-{n}"),
            key_pem: Some(format!("key-{n}")),
        }
    }

    #[test]
    fn ca_type_parse_optional() {
        assert_eq!(CaType::parse_optional("").unwrap(), None);
        assert_eq!(CaType::parse_optional("HostCA").unwrap(), Some(CaType::HostCA));
        assert_eq!(CaType::parse_optional("UserCA").unwrap(), Some(CaType::UserCA));
        assert!(CaType::parse_optional("bogus").is_err());
    }

    #[test]
    fn bootstrap_record_satisfies_invariants() {
        let record = CaRecord::bootstrap(
            CaType::HostCA,
            "test-cluster",
            "priv".into(),
            "pub".into(),
            tls_pair("0"),
        );
        assert!(record.check_invariants());
        assert_eq!(record.rotation.state, RotationState::Standby);
    }

    #[test]
    fn in_progress_requires_two_keys() {
        let mut record = CaRecord::bootstrap(
            CaType::UserCA,
            "test-cluster",
            "priv".into(),
            "pub".into(),
            tls_pair("0"),
        );
        record.rotation.state = RotationState::InProgress;
        record.rotation.phase = RotationPhase::UpdateClients;
        assert!(!record.check_invariants());

        record.signing_keys.push("priv2".into());
        record.checking_keys.push("pub2".into());
        assert!(record.check_invariants());
    }

    #[test]
    fn even_split_schedule_orders_deadlines() {
        let started = Utc::now();
        let schedule = RotationSchedule::even_split(started, Duration::hours(24));
        assert!(schedule.update_clients < schedule.update_servers);
        assert!(schedule.update_servers < schedule.standby);
        assert_eq!(schedule.standby, started + Duration::hours(24));
    }

    #[test]
    fn tls_pair_trusted_only_drops_key() {
        let pair = tls_pair("new").into_trusted_only();
        assert!(pair.key_pem.is_none());
        assert_eq!(pair.cert_pem, "cert-new");
    }

    #[test]
    fn ca_type_display() {
        assert_eq!(CaType::HostCA.to_string(), "HostCA");
        assert_eq!(CaType::UserCA.to_string(), "UserCA");
    }
}
