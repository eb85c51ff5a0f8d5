// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types

use crate::assets::AssetType;
use crate::gpu::GpuError;
use crate::ulid::Ulid;
use thiserror::Error;

/// Asset subsystem error type
#[derive(Error, Debug)]
pub enum AssetError {
    /// No metadata is registered for the identity
    #[error("No asset found for id {0}")]
    NotFound(Ulid),

    /// No constructor/importer registered for the type
    #[error("Asset type {0} is not implemented")]
    TypeNotImplemented(AssetType),

    /// Cached instance has a different type than requested
    #[error("Asset {id} has type {actual} instead of the expected {expected}")]
    TypeMismatch {
        id: Ulid,
        actual: AssetType,
        expected: AssetType,
    },

    /// String is not a 26 character base-32 identity
    #[error("Invalid ULID: {0}")]
    InvalidUlid(String),

    /// Metadata bank row could not be parsed
    #[error("Failed to parse asset metadata: {0}")]
    MetadataParse(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Upload device error
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),

    /// Worker threads could not be started
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Worker pool no longer accepts or runs jobs
    #[error("Worker pool has been stopped")]
    PoolStopped,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AssetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let id = Ulid::from_parts(0x018f2cc2f910, 0xffc6, 0xa32afbe92dec762c);
        let err = AssetError::NotFound(id);
        assert_eq!(err.to_string(), "No asset found for id 01HWPC5Y8GZZ3A6AQVX4PYRXHC");

        let err = AssetError::TypeMismatch {
            id,
            actual: AssetType::Mesh,
            expected: AssetType::Texture2D,
        };
        assert!(err.to_string().contains("has type mesh instead of the expected texture2d"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "metadata.csv");
        let err: AssetError = io.into();
        assert!(matches!(err, AssetError::Io(_)));
    }
}
