// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Caller-facing error messages.
//
// Internal detail (which key version failed, which hash disagreed, which row
// was missing) stays in the logs. Callers get a status code and a fixed
// message per operation.

use crate::error::{ErrorKind, MedcertError};

/// The operation a caller was attempting, which decides the wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Issue,
    Download,
    StatusChange,
}

/// What a caller is told about a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicError {
    /// HTTP status code.
    pub status: u16,
    /// Fixed, non-revealing message.
    pub message: &'static str,
}

/// Map an internal error to the response a caller may see.
pub fn public_error(op: Operation, err: &MedcertError) -> PublicError {
    match (op, err.kind()) {
        (Operation::Issue, ErrorKind::Conflict) => PublicError {
            status: 409,
            message: "certificate already exists for this transaction",
        },
        (Operation::Issue, ErrorKind::NotFound) => PublicError {
            status: 404,
            message: "failed to generate certificate",
        },
        (Operation::Issue, _) => PublicError {
            status: 500,
            message: "failed to generate certificate",
        },

        (Operation::Download, ErrorKind::NotFound) => match err {
            MedcertError::NotFound { entity: "certificate", .. } => PublicError {
                status: 404,
                message: "certificate not found",
            },
            _ => PublicError {
                status: 500,
                message: "failed to retrieve certificate document",
            },
        },
        (Operation::Download, _) => PublicError {
            status: 500,
            message: "failed to retrieve certificate document",
        },

        (Operation::StatusChange, ErrorKind::NotFound) => PublicError {
            status: 404,
            message: "certificate not found",
        },
        (Operation::StatusChange, ErrorKind::Conflict) => PublicError {
            status: 409,
            message: "status change not allowed",
        },
        (Operation::StatusChange, ErrorKind::Unauthorized) => PublicError {
            status: 403,
            message: "not authorized",
        },
        (Operation::StatusChange, ErrorKind::ValidationFailure) => PublicError {
            status: 400,
            message: "invalid status change request",
        },
        (Operation::StatusChange, _) => PublicError {
            status: 500,
            message: "failed to update certificate status",
        },
    }
}
