//! Streamed HTML directory listings.

use std::fs::{self, Metadata};
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use http::StatusCode;
use tracing::warn;

use crate::mime;
use crate::resolver::PathInfo;
use crate::response::{http_date, modified_time, send_ok_headers};
use crate::transport::Transport;

const OTHERS_READ: u32 = 0o004;
const OTHERS_EXEC: u32 = 0o001;

/// Stream an HTML index of the resolved directory.
///
/// Entries go out as individual fragments, never as one buffered page.
/// Directories come first, alphabetical within each group. A directory is
/// listed only when others may traverse it, a file only when others may
/// read it -- the listing never reveals entries the world could not access
/// anyway, regardless of what the server process itself could stat.
pub fn list(transport: &mut dyn Transport, info: &PathInfo) {
    send_ok_headers(transport, StatusCode::OK, None);
    transport.send_header("Content-Type", "text/html");
    transport.end_headers();

    transport.send_chunk(
        format!(
            "<html><head><title>Index of {name}</title></head>\
             <body><h1>Index of {name}</h1><hr /><ol>",
            name = info.name
        )
        .as_bytes(),
    );

    match sorted_entries(&info.phys) {
        Ok(entries) => {
            for (entry, meta) in entries {
                emit_entry(transport, &info.name, &entry, &meta);
            }
        }
        Err(e) => warn!(path = %info.phys.display(), cause = %e, "directory scan failed"),
    }

    transport.send_chunk(b"</ol><hr /></body></html>");
    transport.request_done();
}

fn emit_entry(transport: &mut dyn Transport, base: &str, entry: &str, meta: &Metadata) {
    let (suffix, kind, required_bit) = if meta.is_dir() {
        ("/", "directory", OTHERS_EXEC)
    } else {
        ("", mime::lookup(entry), OTHERS_READ)
    };

    if meta.mode() & required_bit == 0 {
        return;
    }

    let row = format!(
        "<li><strong><a href='{base}{entry}{suffix}'>{entry}</a>{suffix}\
         </strong><br /><small>modified: {date}\
         <br />{kind} - {size:.2} kbyte<br /><br /></small></li>",
        date = http_date(modified_time(meta)),
        size = meta.len() as f64 / 1024.0,
    );
    transport.send_chunk(row.as_bytes());
}

/// Directory entries with metadata, directories before files and
/// alphabetical within each group. Entries whose metadata cannot be read
/// are skipped.
fn sorted_entries(dir: &Path) -> io::Result<Vec<(String, Metadata)>> {
    let mut entries = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(_) => continue,
        };
        let meta = match fs::metadata(entry.path()) {
            Ok(meta) => meta,
            Err(_) => continue,
        };
        entries.push((entry.file_name().to_string_lossy().into_owned(), meta));
    }

    entries.sort_by(|a, b| b.1.is_dir().cmp(&a.1.is_dir()).then_with(|| a.0.cmp(&b.0)));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn directories_sort_before_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("aaa.txt"), b"x").unwrap();
        fs::create_dir(dir.path().join("zzz")).unwrap();

        let entries = sorted_entries(dir.path()).unwrap();
        let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["zzz", "aaa.txt"]);
    }

    #[test]
    fn hidden_modes_are_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let secret = dir.path().join("secret.txt");
        fs::write(&secret, b"x").unwrap();
        fs::set_permissions(&secret, fs::Permissions::from_mode(0o600)).unwrap();

        let entries = sorted_entries(dir.path()).unwrap();
        let (name, meta) = &entries[0];
        assert_eq!(name, "secret.txt");
        // the listing filter drops it even though the scan can see it
        assert_eq!(meta.mode() & OTHERS_READ, 0);
    }
}
