//! RPC status to HTTP status translation.
//!
//! The table is fixed and shared by every executor. Raw codes outside the
//! RPC vocabulary translate to `500`.

use tonic::Code;

/// Status used when a raw code is not part of the RPC vocabulary.
pub const UNRECOGNIZED_STATUS: u16 = 500;

/// Translate an RPC status code into the transport status code.
#[must_use]
pub const fn http_status_for(code: Code) -> u16 {
    match code {
        Code::Ok => 200,
        Code::InvalidArgument | Code::OutOfRange => 400,
        Code::Unauthenticated => 401,
        Code::PermissionDenied => 403,
        Code::NotFound => 404,
        Code::AlreadyExists => 304,
        Code::FailedPrecondition => 412,
        Code::ResourceExhausted => 429,
        Code::Unimplemented => 501,
        Code::Aborted | Code::DataLoss | Code::Internal | Code::Unknown => 502,
        Code::Unavailable => 503,
        Code::Cancelled | Code::DeadlineExceeded => 504,
    }
}

/// Translate a raw numeric RPC status code.
///
/// Numbers outside `0..=16` are not part of the vocabulary and map to
/// [`UNRECOGNIZED_STATUS`].
#[must_use]
pub fn http_status_for_code(raw: i32) -> u16 {
    if (0..=16).contains(&raw) {
        http_status_for(Code::from_i32(raw))
    } else {
        UNRECOGNIZED_STATUS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: [(Code, u16); 17] = [
        (Code::Aborted, 502),
        (Code::AlreadyExists, 304),
        (Code::Cancelled, 504),
        (Code::DataLoss, 502),
        (Code::DeadlineExceeded, 504),
        (Code::FailedPrecondition, 412),
        (Code::Internal, 502),
        (Code::InvalidArgument, 400),
        (Code::NotFound, 404),
        (Code::Ok, 200),
        (Code::OutOfRange, 400),
        (Code::PermissionDenied, 403),
        (Code::ResourceExhausted, 429),
        (Code::Unauthenticated, 401),
        (Code::Unavailable, 503),
        (Code::Unimplemented, 501),
        (Code::Unknown, 502),
    ];

    #[test]
    fn table_matches_exactly() {
        for (code, expected) in TABLE {
            assert_eq!(http_status_for(code), expected, "{code:?}");
            assert_eq!(http_status_for_code(code as i32), expected, "{code:?}");
        }
    }

    #[test]
    fn unrecognized_codes_are_500() {
        assert_eq!(http_status_for_code(17), 500);
        assert_eq!(http_status_for_code(99), 500);
        assert_eq!(http_status_for_code(-1), 500);
    }
}
