use byteorder::{BigEndian as BE, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

pub fn write_i32<W: Write>(w: &mut W, v: i32) -> io::Result<()> { w.write_i32::<BE>(v) }
pub fn read_i32<R: Read>(r: &mut R) -> io::Result<i32> { r.read_i32::<BE>() }

/// `<data path>.ndx`, keeping the data file's own extension.
pub fn index_path_for(data_path: &Path) -> PathBuf {
    let mut s = data_path.as_os_str().to_os_string();
    s.push(".");
    s.push(crate::consts::INDEX_EXTENSION);
    PathBuf::from(s)
}

#[cfg(unix)]
pub fn fsync_dir(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let f = std::fs::OpenOptions::new().read(true).custom_flags(libc::O_DIRECTORY).open(dir)?;
    f.sync_all()
}
#[cfg(not(unix))]
pub fn fsync_dir(_path: &Path) -> io::Result<()> { Ok(()) }
