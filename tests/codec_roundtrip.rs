use requery::codec::{decode, encode};
use requery::error::RequeryError;

#[test]
fn known_vectors() {
    assert_eq!(encode(0), "0");
    assert_eq!(encode(42), "g");
    assert_eq!(encode(123456789), "8M0kX");
    assert_eq!(decode("0").expect("decode 0"), 0);
    assert_eq!(decode("g").expect("decode g"), 42);
    assert_eq!(decode("8M0kX").expect("decode 8M0kX"), 123456789);
}

#[test]
fn round_trips_over_a_large_range() {
    for n in 0..50_000u64 {
        assert_eq!(decode(&encode(n)).expect("round trip"), n, "mismatch at {n}");
    }
    // Powers stress the carry behavior; the extremes stress the width.
    for n in [62, 3843, 3844, 238327, 238328, u64::MAX - 1, u64::MAX] {
        assert_eq!(decode(&encode(n)).expect("round trip"), n, "mismatch at {n}");
    }
}

#[test]
fn rejects_what_encode_never_produces() {
    for bad in ["", "abc!", "no spaces", "g-1", "\u{1f344}", "q=3"] {
        let err = decode(bad).expect_err("should reject");
        assert!(
            matches!(err, RequeryError::InvalidEncoding(_)),
            "wrong error for '{bad}': {err}"
        );
    }
    // Eleven 'z' digits overflow a u64.
    let err = decode("zzzzzzzzzzz").expect_err("should overflow");
    assert!(matches!(err, RequeryError::InvalidEncoding(_)));
}

#[test]
fn longer_encodings_decode_deterministically() {
    // Leading zeros are not produced by encode, but they decode to the
    // same value deterministically rather than erroring.
    assert_eq!(decode("0g").expect("decode"), 42);
    assert_eq!(decode("00g").expect("decode"), 42);
}
