use async_trait::async_trait;
use md5::{Digest, Md5};
use pan123_api::api::UploadApi;
use pan123_api::models::upload::{
    CreateFileData, CreateFileRequest, DuplicatePolicy, SliceUpload, UploadCompleteData,
};
use pan123_api::{ApiError, ApiResult};
use pan123_uploader::uploader::{
    FnProgress, ProgressUpdate, ServerSelection, UploadError, UploadRequest, Uploader,
    UploaderConfig,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
struct SentSlice {
    server: String,
    session_id: String,
    slice_no: u64,
    len: usize,
}

#[derive(Default)]
struct FakeState {
    creates: Vec<CreateFileRequest>,
    slices: Vec<SentSlice>,
    polls: u32,
    polls_by_session: HashMap<String, u32>,
    sessions: HashMap<String, String>,
    stored: HashMap<String, u64>,
    next_file_id: u64,
}

/// In-memory provider with content-addressed dedup
struct FakePan {
    slice_size: u64,
    servers: Vec<String>,
    /// Polls per session answered "not completed" before assembly finishes
    pending_polls: u32,
    forced_reuse: Option<u64>,
    reject_slices: bool,
    state: Mutex<FakeState>,
}

impl FakePan {
    fn new(slice_size: u64) -> Self {
        Self {
            slice_size,
            servers: vec![
                "https://upload-a.example".to_string(),
                "https://upload-b.example".to_string(),
            ],
            pending_polls: 0,
            forced_reuse: None,
            reject_slices: false,
            state: Mutex::new(FakeState {
                next_file_id: 1000,
                ..Default::default()
            }),
        }
    }

    fn with_pending_polls(mut self, n: u32) -> Self {
        self.pending_polls = n;
        self
    }

    fn with_first_file_id(self, id: u64) -> Self {
        self.state.lock().unwrap().next_file_id = id;
        self
    }

    fn with_forced_reuse(mut self, file_id: u64) -> Self {
        self.forced_reuse = Some(file_id);
        self
    }

    fn rejecting_slices(mut self) -> Self {
        self.reject_slices = true;
        self
    }

    fn slices(&self) -> Vec<SentSlice> {
        self.state.lock().unwrap().slices.clone()
    }

    fn creates(&self) -> Vec<CreateFileRequest> {
        self.state.lock().unwrap().creates.clone()
    }

    fn polls(&self) -> u32 {
        self.state.lock().unwrap().polls
    }
}

#[async_trait]
impl UploadApi for FakePan {
    async fn create_file(&self, request: &CreateFileRequest) -> ApiResult<CreateFileData> {
        let mut state = self.state.lock().unwrap();
        state.creates.push(request.clone());

        let known = self
            .forced_reuse
            .or_else(|| state.stored.get(&request.etag).copied());
        if let Some(file_id) = known {
            return Ok(CreateFileData {
                file_id,
                preupload_id: String::new(),
                reuse: true,
                slice_size: 0,
                servers: vec![],
            });
        }

        let session_id = format!("pre-{}", state.creates.len());
        state
            .sessions
            .insert(session_id.clone(), request.etag.clone());
        Ok(CreateFileData {
            file_id: 0,
            preupload_id: session_id,
            reuse: false,
            slice_size: self.slice_size,
            servers: self.servers.clone(),
        })
    }

    async fn upload_slice(&self, slice: SliceUpload) -> ApiResult<()> {
        if self.reject_slices {
            return Err(ApiError::Http {
                status: 403,
                url: slice.server,
                body: "forbidden".to_string(),
            });
        }

        let actual = format!("{:x}", Md5::digest(&slice.data));
        if actual != slice.slice_md5 {
            return Err(ApiError::protocol(1, "slice md5 mismatch", None));
        }

        self.state.lock().unwrap().slices.push(SentSlice {
            server: slice.server,
            session_id: slice.session_id,
            slice_no: slice.slice_no,
            len: slice.data.len(),
        });
        Ok(())
    }

    async fn upload_complete(&self, session_id: &str) -> ApiResult<UploadCompleteData> {
        let mut state = self.state.lock().unwrap();
        state.polls += 1;

        let count = {
            let entry = state
                .polls_by_session
                .entry(session_id.to_string())
                .or_insert(0);
            *entry += 1;
            *entry
        };
        if count <= self.pending_polls {
            return Ok(UploadCompleteData {
                completed: false,
                file_id: 0,
            });
        }

        let etag = state
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| ApiError::protocol(404, "unknown session", None))?;
        let file_id = match state.stored.get(&etag) {
            Some(id) => *id,
            None => {
                let id = state.next_file_id;
                state.next_file_id += 1;
                state.stored.insert(etag, id);
                id
            }
        };
        Ok(UploadCompleteData {
            completed: true,
            file_id,
        })
    }
}

fn test_config() -> UploaderConfig {
    UploaderConfig {
        slice_concurrency: 1,
        max_retries: 2,
        retry_base_delay: Duration::from_millis(1),
        retry_max_delay: Duration::from_millis(2),
        poll_max_attempts: 60,
        poll_interval: Duration::ZERO,
        server_selection: ServerSelection::Random,
    }
}

fn write_file(dir: &Path, name: &str, len: usize) -> PathBuf {
    let path = dir.join(name);
    let data: Vec<u8> = (0..len).map(|i| (i * 31 % 256) as u8).collect();
    std::fs::write(&path, data).unwrap();
    path
}

#[tokio::test]
async fn test_empty_file_sends_no_slices() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "empty.bin", 0);
    let api = Arc::new(FakePan::new(MIB).with_first_file_id(5));
    let uploader = Uploader::new(api.clone(), test_config()).unwrap();

    let file_id = uploader
        .upload(&UploadRequest::new(&path, "empty.bin"))
        .await
        .unwrap();

    assert_eq!(file_id, 5);
    assert!(api.slices().is_empty());
    assert_eq!(api.creates()[0].size, 0);
    assert_eq!(api.creates()[0].etag, "d41d8cd98f00b204e9800998ecf8427e");
}

#[tokio::test]
async fn test_ten_mib_file_in_three_slices() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "big.bin", (10 * MIB) as usize);
    let api = Arc::new(FakePan::new(4 * MIB));
    let uploader = Uploader::new(api.clone(), test_config()).unwrap();

    let updates = Arc::new(Mutex::new(Vec::new()));
    let sink = updates.clone();
    let progress = FnProgress(move |u: ProgressUpdate| sink.lock().unwrap().push(u));

    let file_id = uploader
        .upload_with(
            &UploadRequest::new(&path, "big.bin"),
            &progress,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(file_id, 1000);

    let slices = api.slices();
    let numbered: Vec<(u64, usize)> = slices.iter().map(|s| (s.slice_no, s.len)).collect();
    assert_eq!(
        numbered,
        vec![
            (1, (4 * MIB) as usize),
            (2, (4 * MIB) as usize),
            (3, (2 * MIB) as usize)
        ]
    );
    assert!(slices.iter().all(|s| s.session_id == "pre-1"));
    assert!(slices.iter().all(|s| s.server.starts_with("https://upload-")));

    let updates = updates.lock().unwrap();
    let last = updates.last().unwrap();
    assert_eq!(last.uploaded, 10 * MIB);
    assert_eq!(last.completed_slices, 3);
    assert_eq!(last.total_slices, 3);
}

#[tokio::test]
async fn test_parallel_slices_cover_every_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "par.bin", 1000);
    let api = Arc::new(FakePan::new(64));
    let config = UploaderConfig {
        slice_concurrency: 4,
        server_selection: ServerSelection::RoundRobin,
        ..test_config()
    };
    let uploader = Uploader::new(api.clone(), config).unwrap();

    uploader
        .upload(&UploadRequest::new(&path, "par.bin"))
        .await
        .unwrap();

    let mut indices: Vec<u64> = api.slices().iter().map(|s| s.slice_no).collect();
    indices.sort_unstable();
    assert_eq!(indices, (1..=16).collect::<Vec<u64>>());
    let total: usize = api.slices().iter().map(|s| s.len).sum();
    assert_eq!(total, 1000);
}

#[tokio::test]
async fn test_reuse_short_circuits_transfer() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "known.bin", 4096);
    let api = Arc::new(FakePan::new(MIB).with_forced_reuse(42));
    let uploader = Uploader::new(api.clone(), test_config()).unwrap();

    let file_id = uploader
        .upload(&UploadRequest::new(&path, "known.bin"))
        .await
        .unwrap();

    assert_eq!(file_id, 42);
    assert!(api.slices().is_empty());
    assert_eq!(api.polls(), 0);
}

#[tokio::test]
async fn test_identical_content_is_uploaded_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "same.bin", 300);
    let api = Arc::new(FakePan::new(128));
    let uploader = Uploader::new(api.clone(), test_config()).unwrap();

    let first = uploader
        .upload(&UploadRequest::new(&path, "a/same.bin"))
        .await
        .unwrap();
    let slices_after_first = api.slices().len();
    assert_eq!(slices_after_first, 3);

    let second = uploader
        .upload(&UploadRequest::new(&path, "b/other-name.bin"))
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(api.slices().len(), slices_after_first);
}

#[tokio::test]
async fn test_completion_on_sixtieth_poll() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "slow.bin", 10);
    let api = Arc::new(FakePan::new(MIB).with_pending_polls(59).with_first_file_id(7));
    let uploader = Uploader::new(api.clone(), test_config()).unwrap();

    let file_id = uploader
        .upload(&UploadRequest::new(&path, "slow.bin"))
        .await
        .unwrap();

    assert_eq!(file_id, 7);
    assert_eq!(api.polls(), 60);
}

#[tokio::test]
async fn test_poll_budget_exhausted_is_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "stuck.bin", 10);
    let api = Arc::new(FakePan::new(MIB).with_pending_polls(u32::MAX));
    let config = UploaderConfig {
        poll_max_attempts: 3,
        ..test_config()
    };
    let uploader = Uploader::new(api.clone(), config).unwrap();

    let err = uploader
        .upload(&UploadRequest::new(&path, "stuck.bin"))
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(api.polls(), 3);
}

#[tokio::test]
async fn test_slice_failure_aborts_before_polling() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "denied.bin", 10);
    let api = Arc::new(FakePan::new(MIB).rejecting_slices());
    let uploader = Uploader::new(api.clone(), test_config()).unwrap();

    let err = uploader
        .upload(&UploadRequest::new(&path, "denied.bin"))
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::SliceFailed { index: 1, .. }));
    assert_eq!(err.kind(), "transport");
    assert_eq!(api.polls(), 0);
}

#[tokio::test]
async fn test_missing_local_file_never_negotiates() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(FakePan::new(MIB));
    let uploader = Uploader::new(api.clone(), test_config()).unwrap();

    let err = uploader
        .upload(&UploadRequest::new(dir.path().join("missing.bin"), "x.bin"))
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::InvalidArgument(_)));
    assert!(api.creates().is_empty());
}

#[tokio::test]
async fn test_negotiation_carries_policy_and_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "doc.txt", 20);
    let api = Arc::new(FakePan::new(MIB));
    let uploader = Uploader::new(api.clone(), test_config()).unwrap();

    uploader
        .upload(
            &UploadRequest::new(&path, "docs\\2025\\doc.txt")
                .with_parent_id(9)
                .with_overwrite(true),
        )
        .await
        .unwrap();
    uploader
        .upload(&UploadRequest::new(&path, "flat.txt"))
        .await
        .unwrap();

    let creates = api.creates();
    assert_eq!(creates[0].filename, "docs/2025/doc.txt");
    assert_eq!(creates[0].parent_file_id, 9);
    assert_eq!(creates[0].duplicate, DuplicatePolicy::Overwrite);
    assert!(creates[0].contain_dir);
    assert_eq!(creates[1].duplicate, DuplicatePolicy::KeepBoth);
    assert!(!creates[1].contain_dir);
}

#[tokio::test]
async fn test_cancelled_upload_stops_before_transfer() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "c.bin", 10);
    let api = Arc::new(FakePan::new(MIB));
    let uploader = Uploader::new(api.clone(), test_config()).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = uploader
        .upload_with(
            &UploadRequest::new(&path, "c.bin"),
            &pan123_uploader::uploader::NoOpProgress,
            &cancel,
        )
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(api.slices().is_empty());
}

#[tokio::test]
async fn test_empty_remote_path_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "r.bin", 1);
    let api = Arc::new(FakePan::new(MIB));
    let uploader = Uploader::new(api, test_config()).unwrap();

    let err = uploader
        .upload(&UploadRequest::new(&path, "/"))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::InvalidArgument(_)));
}
