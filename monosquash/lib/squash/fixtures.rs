//! Builders for on-disk image trees used by the squash tests.

use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use serde_json::json;
use tar::{Builder, EntryType, Header};
use tokio::fs;
use walkdir::WalkDir;

use crate::utils::{
    LAYER_JSON_FILENAME, LAYER_TAR_FILENAME, LAYER_VERSION_FILENAME, REPOSITORIES_FILENAME,
    WHITEOUT_OPAQUE, WHITEOUT_PREFIX,
};

use super::{FlattenEvent, FlattenObserver};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An entry of a fixture layer archive.
pub(crate) enum Entry<'a> {
    Dir(&'a str),
    File(&'a str, &'a str),
    Symlink(&'a str, &'a str),

    /// A directory with an explicit mode.
    DirWithMode(&'a str, u32),

    /// A regular file with an explicit mode and owner.
    OwnedFile {
        path: &'a str,
        contents: &'a str,
        mode: u32,
        uid: u64,
        gid: u64,
    },

    /// A `.wh.` marker hiding the given path.
    Whiteout(&'a str),

    /// A `.wh..wh..opq` marker inside the given directory.
    Opaque(&'a str),
}

/// Collects every event it sees.
#[derive(Default)]
pub(crate) struct RecordingObserver {
    events: Mutex<Vec<FlattenEvent>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RecordingObserver {
    pub(crate) fn events(&self) -> Vec<FlattenEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl FlattenObserver for RecordingObserver {
    fn on_event(&self, event: &FlattenEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Writes `<image_dir>/<id>/{json,VERSION,layer.tar}`.
pub(crate) async fn write_layer(
    image_dir: &Path,
    id: &str,
    parent: Option<&str>,
    entries: &[Entry<'_>],
) -> anyhow::Result<()> {
    let layer_dir = image_dir.join(id);
    fs::create_dir_all(&layer_dir).await?;

    let mut record = json!({
        "id": id,
        "container": "4b1e3f2a",
        "created": "2015-06-01T12:00:00.000000000Z",
        "Size": 0,
        "os": "linux",
        "container_config": { "Cmd": ["/bin/sh", "-c", "#(nop)"] },
    });
    if let Some(parent) = parent {
        record["parent"] = json!(parent);
    }

    fs::write(
        layer_dir.join(LAYER_JSON_FILENAME),
        serde_json::to_string_pretty(&record)?,
    )
    .await?;
    fs::write(layer_dir.join(LAYER_VERSION_FILENAME), "1.0").await?;
    write_layer_tar(&layer_dir.join(LAYER_TAR_FILENAME), entries)?;

    Ok(())
}

/// Writes `<image_dir>/repositories` pointing `name:version` at `leaf`.
pub(crate) async fn write_repositories(
    image_dir: &Path,
    name: &str,
    version: &str,
    leaf: &str,
) -> anyhow::Result<()> {
    fs::create_dir_all(image_dir).await?;
    let repositories = json!({ name: { version: leaf } });
    fs::write(
        image_dir.join(REPOSITORIES_FILENAME),
        serde_json::to_string(&repositories)?,
    )
    .await?;
    Ok(())
}

/// Writes a layer archive holding `entries`.
pub(crate) fn write_layer_tar(path: &Path, entries: &[Entry<'_>]) -> io::Result<()> {
    let mut builder = Builder::new(File::create(path)?);

    for entry in entries {
        let mut header = Header::new_gnu();
        header.set_mtime(1_433_160_000);
        match entry {
            Entry::Dir(path) => {
                header.set_entry_type(EntryType::Directory);
                header.set_mode(0o755);
                header.set_size(0);
                header.set_cksum();
                builder.append_data(&mut header, path, io::empty())?;
            }
            Entry::File(path, contents) => {
                header.set_entry_type(EntryType::Regular);
                header.set_mode(0o644);
                header.set_size(contents.len() as u64);
                header.set_cksum();
                builder.append_data(&mut header, path, contents.as_bytes())?;
            }
            Entry::DirWithMode(path, mode) => {
                header.set_entry_type(EntryType::Directory);
                header.set_mode(*mode);
                header.set_size(0);
                header.set_cksum();
                builder.append_data(&mut header, path, io::empty())?;
            }
            Entry::OwnedFile {
                path,
                contents,
                mode,
                uid,
                gid,
            } => {
                header.set_entry_type(EntryType::Regular);
                header.set_mode(*mode);
                header.set_uid(*uid);
                header.set_gid(*gid);
                header.set_size(contents.len() as u64);
                header.set_cksum();
                builder.append_data(&mut header, path, contents.as_bytes())?;
            }
            Entry::Symlink(path, target) => {
                header.set_entry_type(EntryType::Symlink);
                header.set_mode(0o777);
                header.set_size(0);
                builder.append_link(&mut header, path, target)?;
            }
            Entry::Whiteout(path) => {
                let path = Path::new(path);
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let marker = path.with_file_name(format!("{WHITEOUT_PREFIX}{name}"));
                header.set_entry_type(EntryType::Regular);
                header.set_mode(0o644);
                header.set_size(0);
                header.set_cksum();
                builder.append_data(&mut header, marker, io::empty())?;
            }
            Entry::Opaque(dir) => {
                header.set_entry_type(EntryType::Regular);
                header.set_mode(0o644);
                header.set_size(0);
                header.set_cksum();
                let marker = Path::new(dir).join(WHITEOUT_OPAQUE);
                builder.append_data(&mut header, marker, io::empty())?;
            }
        }
    }

    builder.finish()
}

/// Lists every path under `root`, relative and sorted. Directories carry a trailing `/`.
pub(crate) fn list_tree(root: &Path) -> Vec<String> {
    let mut paths = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .map(|entry| {
            let relative: PathBuf = entry.path().strip_prefix(root).unwrap().to_path_buf();
            let mut path = relative.to_string_lossy().into_owned();
            if entry.file_type().is_dir() {
                path.push('/');
            }
            path
        })
        .collect::<Vec<_>>();

    paths.sort();
    paths
}
