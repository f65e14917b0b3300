//! Minimal uncompressed AVI (RIFF) writer.
//!
//! Frames are stored as 24-bit bottom-up BGR DIBs in `00db` chunks with an `idx1`
//! index, which every common player accepts. Totals are unknown until the clip
//! ends, so a placeholder header is written first and rewritten by `finish`.

use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use crate::frame::{Frame, CHANNELS};

const AVIF_HASINDEX: u32 = 0x10;
const AVIIF_KEYFRAME: u32 = 0x10;
const HEADER_LEN: usize = 224;
/// Bytes of `idx1` per frame.
const INDEX_ENTRY_LEN: u64 = 16;
/// Largest file a 32-bit RIFF size field can describe.
const RIFF_LIMIT: u64 = u32::MAX as u64 + 8;

pub struct AviWriter {
    out: BufWriter<File>,
    width: u32,
    height: u32,
    fps: u32,
    frame_bytes: u32,
    /// Chunk offsets relative to the `movi` fourcc.
    index: Vec<u32>,
    /// Bytes written after the `movi` fourcc.
    movi_len: u32,
    row: Vec<u8>,
}

impl AviWriter {
    pub fn create(path: &Path, width: u32, height: u32, fps: u32) -> io::Result<Self> {
        if width == 0 || height == 0 || fps == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "avi dimensions and fps must be non-zero",
            ));
        }
        let stride = dib_stride(width);
        let frame_bytes = u32::try_from(stride * height as usize)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
        let mut out = BufWriter::new(File::create(path)?);
        out.write_all(&header(width, height, fps, frame_bytes, 0, 0))?;
        Ok(Self {
            out,
            width,
            height,
            fps,
            frame_bytes,
            index: Vec::new(),
            movi_len: 0,
            row: vec![0u8; stride],
        })
    }

    pub fn write_frame(&mut self, frame: &Frame) -> io::Result<()> {
        if frame.width != self.width || frame.height != self.height {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "frame is {}x{}, clip is {}x{}",
                    frame.width, frame.height, self.width, self.height
                ),
            ));
        }
        if !self.has_room() {
            return Err(io::Error::other(format!(
                "clip is full at {} frames (RIFF size limit)",
                self.frames()
            )));
        }
        self.index.push(4 + self.movi_len);
        self.out.write_all(b"00db")?;
        self.out.write_all(&self.frame_bytes.to_le_bytes())?;
        for y in (0..self.height).rev() {
            for (dst, src) in self
                .row
                .chunks_exact_mut(CHANNELS)
                .zip(frame.row(y).chunks_exact(CHANNELS))
            {
                dst[0] = src[2];
                dst[1] = src[1];
                dst[2] = src[0];
            }
            self.out.write_all(&self.row)?;
        }
        self.movi_len += 8 + self.frame_bytes;
        Ok(())
    }

    pub fn frames(&self) -> u32 {
        self.index.len() as u32
    }

    /// Whether one more frame, plus its index entry, still fits in the RIFF size
    /// field.
    pub fn has_room(&self) -> bool {
        let frames = self.index.len() as u64 + 1;
        let movi = u64::from(self.movi_len) + 8 + u64::from(self.frame_bytes);
        let total = HEADER_LEN as u64 + movi + 8 + frames * INDEX_ENTRY_LEN;
        total <= RIFF_LIMIT
    }

    /// Write the index, patch the header totals and close the file.
    pub fn finish(mut self) -> io::Result<u32> {
        let frames = self.frames();
        self.out.write_all(b"idx1")?;
        self.out.write_all(&(frames * INDEX_ENTRY_LEN as u32).to_le_bytes())?;
        for offset in &self.index {
            self.out.write_all(b"00db")?;
            self.out.write_all(&AVIIF_KEYFRAME.to_le_bytes())?;
            self.out.write_all(&offset.to_le_bytes())?;
            self.out.write_all(&self.frame_bytes.to_le_bytes())?;
        }
        let mut file = self.out.into_inner().map_err(|e| e.into_error())?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header(
            self.width,
            self.height,
            self.fps,
            self.frame_bytes,
            frames,
            self.movi_len,
        ))?;
        file.sync_all()?;
        Ok(frames)
    }
}

fn dib_stride(width: u32) -> usize {
    (width as usize * CHANNELS + 3) & !3
}

fn header(width: u32, height: u32, fps: u32, frame_bytes: u32, frames: u32, movi_len: u32) -> Vec<u8> {
    let mut h = Vec::with_capacity(HEADER_LEN);
    let riff_len = 4 + (8 + 192) + (8 + 4 + movi_len) + (8 + 16 * frames);

    h.extend_from_slice(b"RIFF");
    put_u32(&mut h, riff_len);
    h.extend_from_slice(b"AVI ");

    h.extend_from_slice(b"LIST");
    put_u32(&mut h, 192);
    h.extend_from_slice(b"hdrl");

    h.extend_from_slice(b"avih");
    put_u32(&mut h, 56);
    put_u32(&mut h, 1_000_000 / fps);
    put_u32(&mut h, frame_bytes.saturating_mul(fps));
    put_u32(&mut h, 0);
    put_u32(&mut h, AVIF_HASINDEX);
    put_u32(&mut h, frames);
    put_u32(&mut h, 0);
    put_u32(&mut h, 1);
    put_u32(&mut h, frame_bytes);
    put_u32(&mut h, width);
    put_u32(&mut h, height);
    for _ in 0..4 {
        put_u32(&mut h, 0);
    }

    h.extend_from_slice(b"LIST");
    put_u32(&mut h, 116);
    h.extend_from_slice(b"strl");

    h.extend_from_slice(b"strh");
    put_u32(&mut h, 56);
    h.extend_from_slice(b"vids");
    h.extend_from_slice(b"DIB ");
    put_u32(&mut h, 0);
    h.extend_from_slice(&0u16.to_le_bytes());
    h.extend_from_slice(&0u16.to_le_bytes());
    put_u32(&mut h, 0);
    put_u32(&mut h, 1);
    put_u32(&mut h, fps);
    put_u32(&mut h, 0);
    put_u32(&mut h, frames);
    put_u32(&mut h, frame_bytes);
    put_u32(&mut h, u32::MAX);
    put_u32(&mut h, frame_bytes);
    for v in [0u16, 0, width as u16, height as u16] {
        h.extend_from_slice(&v.to_le_bytes());
    }

    h.extend_from_slice(b"strf");
    put_u32(&mut h, 40);
    put_u32(&mut h, 40);
    put_u32(&mut h, width);
    put_u32(&mut h, height);
    h.extend_from_slice(&1u16.to_le_bytes());
    h.extend_from_slice(&24u16.to_le_bytes());
    put_u32(&mut h, 0);
    put_u32(&mut h, frame_bytes);
    for _ in 0..4 {
        put_u32(&mut h, 0);
    }

    h.extend_from_slice(b"LIST");
    put_u32(&mut h, 4 + movi_len);
    h.extend_from_slice(b"movi");

    debug_assert_eq!(h.len(), HEADER_LEN);
    h
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_u32(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
    }

    #[test]
    fn header_is_fixed_size() {
        assert_eq!(header(640, 480, 20, 640 * 480 * 3, 0, 0).len(), HEADER_LEN);
    }

    #[test]
    fn writes_playable_layout() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("clip.avi");
        let mut writer = AviWriter::create(&path, 6, 4, 20)?;
        let mut frame = Frame::filled(6, 4, 10);
        frame.fill_rect(0, 0, 1, 1, [1, 2, 3]);
        writer.write_frame(&frame)?;
        writer.write_frame(&frame)?;
        assert_eq!(writer.finish()?, 2);

        let bytes = std::fs::read(&path)?;
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"AVI ");
        assert_eq!(read_u32(&bytes, 4) as usize, bytes.len() - 8);
        // avih dwTotalFrames
        assert_eq!(read_u32(&bytes, 48), 2);
        assert_eq!(&bytes[HEADER_LEN..HEADER_LEN + 4], b"00db");

        // 6 px * 3 = 18 bytes, padded to 20; bottom-up, so the top-left pixel
        // lands in the last row of the first frame as BGR.
        let stride = 20;
        let first_pixel = HEADER_LEN + 8 + 3 * stride;
        assert_eq!(&bytes[first_pixel..first_pixel + 3], &[3, 2, 1]);
        Ok(())
    }

    #[test]
    fn stops_at_riff_size_limit() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("clip.avi");
        let mut writer = AviWriter::create(&path, 1920, 1080, 20)?;
        writer.write_frame(&Frame::filled(1920, 1080, 0))?;
        let chunk = 8 + writer.frame_bytes;
        // Pretend 690 full-HD frames were already written.
        writer.movi_len = 690 * chunk;
        writer.index = (0..690).map(|i| 4 + i * chunk).collect();

        assert!(!writer.has_room());
        let err = writer
            .write_frame(&Frame::filled(1920, 1080, 0))
            .expect_err("frame past the size limit");
        assert!(err.to_string().contains("size limit"));
        assert_eq!(writer.frames(), 690);

        let frames = writer.finish()?;
        let bytes = std::fs::read(&path)?;
        assert_eq!(read_u32(&bytes, 48), frames);
        assert_eq!(read_u32(&bytes, 4), 4 + 200 + 12 + 690 * chunk + 8 + 690 * 16);
        Ok(())
    }

    #[test]
    fn rejects_mismatched_frame() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut writer = AviWriter::create(&dir.path().join("clip.avi"), 4, 4, 20)?;
        assert!(writer.write_frame(&Frame::filled(8, 8, 0)).is_err());
        Ok(())
    }
}
