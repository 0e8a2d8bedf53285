use std::fs::File;
use std::io;
use std::io::{BufReader, Cursor, Read, Write};
use std::path::Path;
use bincode::{Decode, Encode};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use msdecon::data::spectrum::MsScan;
use crate::error::{IndexError, Result};

pub const PEAK_INDEX_MAGIC: [u8; 4] = *b"MSPI";
pub const DIA_INDEX_MAGIC: [u8; 4] = *b"MSDI";
pub const FORMAT_VERSION: u16 = 1;

// magic plus version
const HEADER_LEN: usize = 6;
const COMPRESSION_LEVEL: i32 = 3;

/// Decompresses a ZSTD compressed byte array
///
/// # Arguments
///
/// * `compressed_data` - A byte slice that holds the compressed data
///
/// # Returns
///
/// * `decompressed_data` - A vector of u8 that holds the decompressed data
///
pub fn zstd_decompress(compressed_data: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = zstd::Decoder::new(compressed_data)?;
    let mut decompressed_data = Vec::new();
    decoder.read_to_end(&mut decompressed_data)?;
    Ok(decompressed_data)
}

/// Compresses a byte array using ZSTD
///
/// # Arguments
///
/// * `decompressed_data` - A byte slice that holds the decompressed data
/// * `compression_level` - ZSTD level, 1 to 22
///
/// # Returns
///
/// * `compressed_data` - A vector of u8 that holds the compressed data
///
pub fn zstd_compress(decompressed_data: &[u8], compression_level: i32) -> io::Result<Vec<u8>> {
    let mut encoder = zstd::Encoder::new(Vec::new(), compression_level)?;
    encoder.write_all(decompressed_data)?;
    encoder.finish()
}

/// Encodes a value as magic, little endian format version and a zstd compressed bincode payload.
///
/// # Examples
///
/// ```
/// use msindex::persist::{decode_blob, encode_blob};
///
/// let blob = encode_blob(*b"TEST", &vec![1.5f64, 2.5]).unwrap();
/// assert_eq!(&blob[..4], b"TEST");
/// let decoded: Vec<f64> = decode_blob(*b"TEST", &blob).unwrap();
/// assert_eq!(decoded, vec![1.5, 2.5]);
/// ```
pub fn encode_blob<T: Encode>(magic: [u8; 4], value: &T) -> Result<Vec<u8>> {
    let payload = bincode::encode_to_vec(value, bincode::config::standard())?;
    let compressed = zstd_compress(&payload, COMPRESSION_LEVEL)?;

    let mut blob = Vec::with_capacity(HEADER_LEN + compressed.len());
    blob.write_all(&magic)?;
    blob.write_u16::<LittleEndian>(FORMAT_VERSION)?;
    blob.extend_from_slice(&compressed);
    Ok(blob)
}

/// Inverse of [`encode_blob`], checks magic, version and that the payload is fully consumed.
pub fn decode_blob<T: Decode<()>>(magic: [u8; 4], bytes: &[u8]) -> Result<T> {
    let mut cursor = Cursor::new(bytes);

    let mut found = [0u8; 4];
    cursor.read_exact(&mut found).map_err(|_| IndexError::InvalidBlob("truncated header".to_string()))?;
    if found != magic {
        return Err(IndexError::InvalidBlob(format!(
            "expected magic {}, found {}",
            String::from_utf8_lossy(&magic),
            String::from_utf8_lossy(&found)
        )));
    }

    let version = cursor.read_u16::<LittleEndian>().map_err(|_| IndexError::InvalidBlob("truncated header".to_string()))?;
    if version != FORMAT_VERSION {
        return Err(IndexError::InvalidBlob(format!("unsupported format version {}, expected {}", version, FORMAT_VERSION)));
    }

    let payload = zstd_decompress(&bytes[HEADER_LEN..])?;
    let (value, read) = bincode::decode_from_slice(&payload, bincode::config::standard())?;
    if read != payload.len() {
        return Err(IndexError::InvalidBlob(format!("{} trailing bytes after payload", payload.len() - read)));
    }

    Ok(value)
}

/// Reads a JSON array of scans.
pub fn read_scans_json<P: AsRef<Path>>(path: P) -> Result<Vec<MsScan>> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    let scans: Vec<MsScan> = serde_json::from_reader(reader)?;
    log::info!("read {} scans from {}", scans.len(), path.as_ref().display());
    Ok(scans)
}

pub fn write_blob<P: AsRef<Path>>(path: P, blob: &[u8]) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(blob)?;
    Ok(())
}

pub fn read_blob<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    Ok(std::fs::read(path)?)
}
