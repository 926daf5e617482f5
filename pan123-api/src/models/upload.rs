use crate::error::{ApiError, ApiResult};
use bytes::Bytes;
use serde::{Deserialize, Serialize, Serializer};

/// Server behaviour when the target name already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Keep both files, the new one gets renamed
    #[default]
    KeepBoth,
    /// Replace the existing file
    Overwrite,
}

impl DuplicatePolicy {
    pub fn from_overwrite(overwrite: bool) -> Self {
        if overwrite {
            DuplicatePolicy::Overwrite
        } else {
            DuplicatePolicy::KeepBoth
        }
    }

    pub fn as_code(self) -> u8 {
        match self {
            DuplicatePolicy::KeepBoth => 1,
            DuplicatePolicy::Overwrite => 2,
        }
    }
}

impl Serialize for DuplicatePolicy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_code())
    }
}

/// Create-session request
#[derive(Debug, Clone, Serialize)]
pub struct CreateFileRequest {
    #[serde(rename = "parentFileID")]
    pub parent_file_id: u64,
    pub filename: String,
    /// Lowercase hex MD5 of the whole file
    pub etag: String,
    pub size: u64,
    pub duplicate: DuplicatePolicy,
    #[serde(rename = "containDir")]
    pub contain_dir: bool,
}

/// Create-session response
#[derive(Debug, Clone, Deserialize)]
pub struct CreateFileData {
    #[serde(rename = "fileID", default)]
    pub file_id: u64,
    #[serde(rename = "preuploadID", default)]
    pub preupload_id: String,
    #[serde(default)]
    pub reuse: bool,
    #[serde(rename = "sliceSize", default)]
    pub slice_size: u64,
    #[serde(default)]
    pub servers: Vec<String>,
}

impl CreateFileData {
    /// Validate the response and freeze it into an [`UploadSession`]
    pub fn into_session(self, total_size: u64, content_hash: String) -> ApiResult<UploadSession> {
        if self.reuse {
            if self.file_id == 0 {
                return Err(ApiError::InvalidResponse(
                    "reuse response carries no fileID".to_string(),
                ));
            }
            return Ok(UploadSession {
                session_id: self.preupload_id,
                slice_size: self.slice_size,
                servers: self.servers,
                reuse_file_id: Some(self.file_id),
                total_size,
                content_hash,
            });
        }

        if self.preupload_id.is_empty() {
            return Err(ApiError::InvalidResponse(
                "create-session response has no preuploadID".to_string(),
            ));
        }
        if self.slice_size == 0 {
            return Err(ApiError::InvalidResponse(
                "create-session response has a zero sliceSize".to_string(),
            ));
        }
        if self.servers.is_empty() {
            return Err(ApiError::InvalidResponse(
                "create-session response lists no upload servers".to_string(),
            ));
        }

        Ok(UploadSession {
            session_id: self.preupload_id,
            slice_size: self.slice_size,
            servers: self.servers,
            reuse_file_id: None,
            total_size,
            content_hash,
        })
    }
}

/// Negotiated upload session, immutable once created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub session_id: String,
    pub slice_size: u64,
    pub servers: Vec<String>,
    /// Set when the server already stores identical content
    pub reuse_file_id: Option<u64>,
    pub total_size: u64,
    pub content_hash: String,
}

impl UploadSession {
    /// A reused session is terminal, no slices are sent
    pub fn is_reused(&self) -> bool {
        self.reuse_file_id.is_some()
    }
}

/// One slice transmission
#[derive(Debug, Clone)]
pub struct SliceUpload {
    /// Upload server base URL taken from the session
    pub server: String,
    pub session_id: String,
    /// 1-based slice number
    pub slice_no: u64,
    /// Lowercase hex MD5 of `data`
    pub slice_md5: String,
    pub data: Bytes,
}

/// Completion poll request
#[derive(Debug, Clone, Serialize)]
pub struct UploadCompleteRequest {
    #[serde(rename = "preuploadID")]
    pub preupload_id: String,
}

/// Completion poll response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct UploadCompleteData {
    #[serde(default)]
    pub completed: bool,
    #[serde(rename = "fileID", default)]
    pub file_id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_wire_format() {
        let req = CreateFileRequest {
            parent_file_id: 0,
            filename: "dir/a.bin".into(),
            etag: "d41d8cd98f00b204e9800998ecf8427e".into(),
            size: 0,
            duplicate: DuplicatePolicy::from_overwrite(true),
            contain_dir: true,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["parentFileID"], 0);
        assert_eq!(json["duplicate"], 2);
        assert_eq!(json["containDir"], true);
        assert_eq!(serde_json::to_value(DuplicatePolicy::KeepBoth).unwrap(), 1);
    }

    #[test]
    fn test_reuse_response_skips_validation() {
        let data: CreateFileData = serde_json::from_str(
            r#"{"fileID":42,"reuse":true,"preuploadID":"","sliceSize":0,"servers":[]}"#,
        )
        .unwrap();
        let session = data.into_session(10, "hash".into()).unwrap();
        assert!(session.is_reused());
        assert_eq!(session.reuse_file_id, Some(42));
    }

    #[test]
    fn test_reuse_without_file_id_is_rejected() {
        let missing: CreateFileData = serde_json::from_str(r#"{"reuse":true}"#).unwrap();
        assert!(matches!(
            missing.into_session(10, "hash".into()),
            Err(ApiError::InvalidResponse(_))
        ));

        let zero: CreateFileData =
            serde_json::from_str(r#"{"fileID":0,"reuse":true,"servers":[]}"#).unwrap();
        assert!(zero.into_session(10, "hash".into()).is_err());
    }

    #[test]
    fn test_session_requires_servers_and_slice_size() {
        let no_servers: CreateFileData = serde_json::from_str(
            r#"{"fileID":0,"reuse":false,"preuploadID":"p","sliceSize":16777216,"servers":[]}"#,
        )
        .unwrap();
        assert!(no_servers.into_session(1, "h".into()).is_err());

        let zero_slice: CreateFileData = serde_json::from_str(
            r#"{"fileID":0,"reuse":false,"preuploadID":"p","sliceSize":0,"servers":["https://u"]}"#,
        )
        .unwrap();
        assert!(zero_slice.into_session(1, "h".into()).is_err());
    }

    #[test]
    fn test_valid_session() {
        let json = r#"{"fileID":0,"reuse":false,"preuploadID":"p-1","sliceSize":4194304,
            "servers":["https://a","https://b"]}"#;
        let data: CreateFileData = serde_json::from_str(json).unwrap();
        let session = data.into_session(100, "h".into()).unwrap();
        assert_eq!(session.session_id, "p-1");
        assert_eq!(session.slice_size, 4194304);
        assert_eq!(session.servers.len(), 2);
        assert!(!session.is_reused());
    }
}
