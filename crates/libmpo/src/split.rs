
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use log::{trace, warn};

use crate::error::{Error, Result};
use crate::jpeg::{EOI, MARKER_PREFIX, SOI};

const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Cuts an in-memory buffer of back-to-back JPEGs into the individual pictures.
///
/// An EOI marker closes a picture when the next picture's SOI follows it, or when it ends
/// the buffer. Bytes after the last closing EOI are dropped.
pub fn split_mpo_bytes(bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut images = Vec::new();
    let mut start = 0;
    for i in 0..bytes.len().saturating_sub(1) {
        if bytes[i] != MARKER_PREFIX || bytes[i + 1] != EOI {
            continue;
        }
        let ends_buffer = i + 3 >= bytes.len();
        let before_soi = !ends_buffer && bytes[i + 2] == MARKER_PREFIX && bytes[i + 3] == SOI;
        if ends_buffer || before_soi {
            images.push(bytes[start..i + 2].to_vec());
            start = i + 2;
        }
    }

    if start < bytes.len() {
        trace!("Dropping {} trailing bytes", bytes.len() - start);
    }
    images
}

/// Counts EOI markers one byte at a time, so a marker split across two reads is still seen.
///
/// Every second marker closes a picture: the first one ends the Exif thumbnail.
#[derive(Debug, Default)]
struct EoiScanner {
    previous: Option<u8>,
    markers: u32,
}

impl EoiScanner {
    /// Returns `true` if `byte` completes a marker that closes a picture.
    fn push(&mut self, byte: u8) -> bool {
        let is_marker = self.previous == Some(MARKER_PREFIX) && byte == EOI;
        self.previous = Some(byte);
        if !is_marker {
            return false;
        }

        self.markers += 1;
        if self.markers == 2 {
            self.markers = 0;
            true
        } else {
            false
        }
    }
}

/// The pictures cut from a stream, and the read fault that stopped it early, if any.
#[derive(Debug)]
pub struct Split {
    pub images: Vec<Vec<u8>>,
    pub fault: Option<Error>,
}

impl Split {
    /// `true` if the whole stream was read.
    pub fn is_complete(&self) -> bool {
        self.fault.is_none()
    }

    /// The pictures cut so far, whether or not the stream failed.
    pub fn into_images(self) -> Vec<Vec<u8>> {
        self.images
    }

    pub fn into_result(self) -> Result<Vec<Vec<u8>>> {
        match self.fault {
            Some(fault) => Err(fault),
            None => Ok(self.images),
        }
    }
}

/// Cuts a stream of back-to-back JPEGs, each carrying an Exif thumbnail, into pictures.
#[derive(Debug, Clone)]
pub struct StreamSplitter {
    buffer_size: usize,
}

impl Default for StreamSplitter {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl StreamSplitter {
    /// Size of each read from the source. The result does not depend on it.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    pub fn split<R: Read>(&self, mut reader: R) -> Split {
        let mut buffer = vec![0u8; self.buffer_size];
        let mut scanner = EoiScanner::default();
        let mut current = Vec::new();
        let mut images = Vec::new();

        loop {
            let read_count = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Read error after {} images, returning partial result: {}", images.len(), e);
                    return Split {
                        images,
                        fault: Some(e.into()),
                    };
                }
            };

            let chunk = &buffer[..read_count];
            let mut start = 0;
            for (i, &byte) in chunk.iter().enumerate() {
                if scanner.push(byte) {
                    current.extend_from_slice(&chunk[start..=i]);
                    images.push(std::mem::take(&mut current));
                    start = i + 1;
                }
            }
            current.extend_from_slice(&chunk[start..]);
        }

        if !current.is_empty() {
            trace!("Dropping {} trailing bytes", current.len());
        }
        Split { images, fault: None }
    }
}

pub fn split_mpo_reader<R: Read>(reader: R) -> Split {
    StreamSplitter::default().split(reader)
}

pub fn split_mpo_file<P: AsRef<Path>>(path: P) -> Split {
    match File::open(path.as_ref()) {
        Ok(file) => split_mpo_reader(file),
        Err(e) => {
            warn!("Failed to open {}: {}", path.as_ref().display(), e);
            Split {
                images: Vec::new(),
                fault: Some(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::jpeg::tests::tiny_jpeg;
    use crate::jpeg::{APP1, EXIF_IDENTIFIER, app_segment};

    /// A JPEG whose APP1 segment embeds a thumbnail, so it holds two EOI markers.
    fn jpeg_with_thumbnail(scan: &[u8]) -> Vec<u8> {
        let mut exif = EXIF_IDENTIFIER.to_vec();
        exif.extend_from_slice(&tiny_jpeg(&[], &[0x10, 0x20]));
        tiny_jpeg(&[app_segment(APP1, &exif).unwrap()], scan)
    }

    fn concat(images: &[Vec<u8>]) -> Vec<u8> {
        images.concat()
    }

    #[test]
    fn two_pictures_split_into_their_lengths() {
        let first = tiny_jpeg(&[], &[0x01, 0x02, 0x03]);
        let second = tiny_jpeg(&[], &[0x04, 0x05]);
        let images = split_mpo_bytes(&concat(&[first.clone(), second.clone()]));
        assert_eq!(images, vec![first, second]);
    }

    #[test]
    fn thumbnail_eoi_is_not_a_boundary() {
        let pictures = vec![jpeg_with_thumbnail(&[0x01]), jpeg_with_thumbnail(&[0x02, 0x03]), tiny_jpeg(&[], &[0x04])];
        let images = split_mpo_bytes(&concat(&pictures));
        assert_eq!(images, pictures);
        for image in &images {
            assert_eq!(&image[..2], &[0xFF, 0xD8]);
            assert_eq!(&image[image.len() - 2..], &[0xFF, 0xD9]);
        }
    }

    #[test]
    fn trailing_bytes_are_dropped() {
        let picture = tiny_jpeg(&[], &[0x01]);
        let mut bytes = picture.clone();
        bytes.extend_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44]);
        assert_eq!(split_mpo_bytes(&bytes), vec![picture]);
        assert!(split_mpo_bytes(&[]).is_empty());
        assert!(split_mpo_bytes(&[0xFF]).is_empty());
    }

    #[test]
    fn scanner_sees_markers_across_pushes() {
        let mut scanner = EoiScanner::default();
        let closed: Vec<bool> = [0xFF, 0xD9, 0x00, 0xFF, 0xFF, 0xD9, 0xD9].iter().map(|&b| scanner.push(b)).collect();
        assert_eq!(closed, vec![false, false, false, false, false, true, false]);
    }

    #[test]
    fn stream_split_does_not_depend_on_buffer_size() {
        let pictures = vec![jpeg_with_thumbnail(&[0x01]), jpeg_with_thumbnail(&[0x02, 0x03]), jpeg_with_thumbnail(&[0x04])];
        let bytes = concat(&pictures);

        for buffer_size in (1..=bytes.len() + 1).chain([DEFAULT_BUFFER_SIZE]) {
            let split = StreamSplitter::default().with_buffer_size(buffer_size).split(Cursor::new(&bytes));
            assert!(split.is_complete());
            assert_eq!(split.into_images(), pictures, "buffer size {}", buffer_size);
        }
    }

    #[test]
    fn marker_straddling_reads() {
        let first = jpeg_with_thumbnail(&[0x01]);
        let second = jpeg_with_thumbnail(&[0x02]);
        let bytes = concat(&[first.clone(), second.clone()]);

        // The read boundary falls between the 0xFF and 0xD9 of the first picture's EOI.
        let buffer_size = first.len() - 1;
        let images = StreamSplitter::default().with_buffer_size(buffer_size).split(Cursor::new(&bytes)).into_result().unwrap();
        assert_eq!(images, vec![first, second]);
    }

    /// Serves `data`, then fails.
    struct FailingReader {
        data: Cursor<Vec<u8>>,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(std::io::Error::other("device unplugged")),
                n => Ok(n),
            }
        }
    }

    #[test]
    fn read_fault_keeps_partial_result() {
        let first = jpeg_with_thumbnail(&[0x01]);
        let mut data = first.clone();
        data.extend_from_slice(&jpeg_with_thumbnail(&[0x02])[..10]);

        let split = split_mpo_reader(FailingReader { data: Cursor::new(data) });
        assert!(!split.is_complete());
        assert!(split.fault.as_ref().is_some_and(Error::is_io));
        assert_eq!(split.images, vec![first.clone()]);
        assert_eq!(split.into_images(), vec![first.clone()]);

        let split = split_mpo_reader(FailingReader { data: Cursor::new(first) });
        assert!(split.into_result().is_err());
    }

    #[test]
    fn missing_file_is_a_fault() {
        let split = split_mpo_file("/nonexistent/libmpo/input.mpo");
        assert!(split.images.is_empty());
        assert!(split.fault.is_some());
    }
}
