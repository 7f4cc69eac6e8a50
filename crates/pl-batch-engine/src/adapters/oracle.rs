//! Attestation Oracle Validator
//!
//! Implements `OracleValidator` for hash attestations: an attestation is the
//! hex SHA-256 of the oracle name and the claim, and only oracles from a
//! fixed trusted set are accepted.

use crate::domain::entities::OracleProof;
use crate::domain::errors::OracleError;
use crate::domain::value_objects::TxId;
use crate::ports::outbound::OracleValidator;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use tracing::debug;

/// Attestation an oracle named `oracle` produces for `claim`.
pub fn attest(oracle: &str, claim: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(oracle.as_bytes());
    hasher.update([0u8]);
    hasher.update(claim.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Clone, Debug, Default)]
pub struct AttestationOracleValidator {
    trusted: BTreeSet<String>,
}

impl AttestationOracleValidator {
    pub fn new(trusted: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            trusted: trusted.into_iter().map(Into::into).collect(),
        }
    }

    fn check(&self, proof: &OracleProof) -> Result<(), OracleError> {
        if !self.trusted.contains(&proof.oracle) {
            return Err(OracleError::Rejected {
                oracle: proof.oracle.clone(),
                reason: "oracle is not trusted".into(),
            });
        }
        if !proof
            .attestation
            .eq_ignore_ascii_case(&attest(&proof.oracle, &proof.claim))
        {
            return Err(OracleError::Rejected {
                oracle: proof.oracle.clone(),
                reason: format!("attestation does not match claim {:?}", proof.claim),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl OracleValidator for AttestationOracleValidator {
    async fn validate(&self, tx: TxId, proofs: &[OracleProof]) -> Result<(), OracleError> {
        for proof in proofs {
            self.check(proof)?;
        }
        debug!(tx = ?tx, proofs = proofs.len(), "Oracle proofs accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use primitive_types::H256;

    fn validator() -> AttestationOracleValidator {
        AttestationOracleValidator::new(["fx-feed"])
    }

    #[tokio::test]
    async fn test_valid_attestation_accepted() {
        let proof = OracleProof::new("fx-feed", "EUR/USD=1.0842", attest("fx-feed", "EUR/USD=1.0842"));
        assert!(validator().validate(H256::zero(), &[proof]).await.is_ok());
    }

    #[tokio::test]
    async fn test_untrusted_oracle_rejected() {
        let proof = OracleProof::new("rogue", "EUR/USD=9", attest("rogue", "EUR/USD=9"));
        let err = validator().validate(H256::zero(), &[proof]).await.unwrap_err();
        assert!(matches!(err, OracleError::Rejected { oracle, .. } if oracle == "rogue"));
    }

    #[tokio::test]
    async fn test_tampered_claim_rejected() {
        let proof = OracleProof::new("fx-feed", "EUR/USD=2.0", attest("fx-feed", "EUR/USD=1.0842"));
        assert!(validator().validate(H256::zero(), &[proof]).await.is_err());
    }

    #[tokio::test]
    async fn test_no_proofs_is_fine() {
        assert!(validator().validate(H256::zero(), &[]).await.is_ok());
    }
}
