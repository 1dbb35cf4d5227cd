//! Event identity and Schnorr signature verification.

use anyhow::{anyhow, Result};
use secp256k1::{schnorr::Signature, Message, Secp256k1, XOnlyPublicKey};

use crate::event::{event_hash, Event};

/// Check an event's identity hash and BIP-340 signature.
///
/// Any internal failure (bad hex, wrong lengths, curve rejection) yields
/// `false`; callers never see an error.
pub fn verify(ev: &Event) -> bool {
    verify_inner(ev).is_ok()
}

fn verify_inner(ev: &Event) -> Result<()> {
    let hash = event_hash(ev)?;
    let calc_id = hex::encode(hash);
    if calc_id != ev.id {
        return Err(anyhow!("id mismatch"));
    }
    let sig = Signature::from_slice(&hex::decode(&ev.sig)?)?;
    let pk = XOnlyPublicKey::from_slice(&hex::decode(&ev.pubkey)?)?;
    let secp = Secp256k1::verification_only();
    let msg = Message::from_digest_slice(&hash)?;
    secp.verify_schnorr(&sig, &msg, &pk)?;
    Ok(())
}
