/**
 * Payment accounting types.
 *  - Credits: the unit of value attached to
 *    payable backend writes
 */
pub mod credits;
/**
 * Content integrity values.
 *  Fixed-size fingerprints attached to chunks,
 *  with an all-zero sentinel for "absent".
 */
pub mod fingerprint;
/**
 * Addressing keys.
 *  - ObjectKey: logical name, normalized to a
 *    fixed-size fingerprint
 *  - BlobKey: physical addressing key within
 *    the blob backend
 *  - WriterId: caller identity mixed into
 *    generated blob keys
 */
pub mod key;

pub mod prelude {
    pub use crate::credits::Credits;
    pub use crate::fingerprint::Fingerprint;
    pub use crate::key::{BlobKey, KeyError, ObjectKey, WriterId};
}
