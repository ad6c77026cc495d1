//! Plain-text VCF stream helpers
//!

use std::fs::File;
use std::io::{BufRead, BufReader, Read};

use camino::{Utf8Path, Utf8PathBuf};
use const_format::concatcp;
use flate2::read::MultiGzDecoder;
use simple_error::{SimpleResult, try_with};

use crate::globals::{PROGRAM_NAME, PROGRAM_VERSION};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

const PROGRAM_HEADER_PREFIX: &str = concatcp!("##", PROGRAM_NAME, "_cmdline=");

/// Open a VCF file for line reading, transparently decompressing gzip/bgzip input
///
pub fn open_vcf_reader(filename: &Utf8Path) -> SimpleResult<Box<dyn BufRead>> {
    let mut file = try_with!(File::open(filename), "Unable to open VCF file '{filename}'");
    let mut magic = [0u8; 2];
    let is_gzip = match file.read_exact(&mut magic) {
        Ok(_) => magic == GZIP_MAGIC,
        Err(_) => false,
    };
    let file = try_with!(File::open(filename), "Unable to open VCF file '{filename}'");
    if is_gzip {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Strip a trailing ".gz" and ".vcf" from a VCF file name
pub fn vcf_base_name(filename: &Utf8Path) -> String {
    let name = filename.file_name().unwrap_or("variants.vcf");
    let name = name.strip_suffix(".gz").unwrap_or(name);
    name.strip_suffix(".vcf").unwrap_or(name).to_string()
}

/// Path in `work_dir` for an uncompressed intermediate copy of `filename` tagged with `suffix`
///
/// For example "x.vcf.gz" with suffix "r1" becomes "<work_dir>/x.r1.vcf"
///
pub fn intermediate_vcf_path(work_dir: &Utf8Path, filename: &Utf8Path, suffix: &str) -> Utf8PathBuf {
    work_dir.join(format!("{}.{suffix}.vcf", vcf_base_name(filename)))
}

pub fn filter_header_line(id: &str, description: &str) -> String {
    format!("##FILTER=<ID={id},Description=\"{description}\">")
}

/// FILTER ID declared by a header line, if it is a FILTER line
pub fn declared_filter_id(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("##FILTER=<ID=")?;
    rest.split([',', '>']).next()
}

/// Header line recording the program version and command line which rewrote the file
pub fn program_header_line() -> String {
    let cmdline = std::env::args().collect::<Vec<_>>().join(" ");
    format!("{PROGRAM_HEADER_PREFIX}\"{cmdline}\" version={PROGRAM_VERSION}")
}

pub fn is_program_header_line(line: &str) -> bool {
    line.starts_with(PROGRAM_HEADER_PREFIX)
}
