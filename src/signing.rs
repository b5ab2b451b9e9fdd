// Booking request signature
//
// The platform authorises per-booking calls (getBookingDetails, rescheduleBook) with
// md5(booking_id ++ booking_hash ++ secret_key) as lowercase hex. The digest is part of
// the remote contract, not a security boundary of this crate: changing the algorithm
// here without the platform changing it too breaks every signed call.

use md5::{Digest, Md5};

pub fn booking_sign(booking_id: &str, booking_hash: &str, secret_key: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(booking_id.as_bytes());
    hasher.update(booking_hash.as_bytes());
    hasher.update(secret_key.as_bytes());
    hex::encode(hasher.finalize())
}
