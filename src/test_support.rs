//! Builders for synthetic RAR5 images used across the test modules.

use crate::crypto::{
    derive_key, CheckDerivation, CHECK_EXTRA_ROUNDS, KEY_LEN, SIZE_INITV, SIZE_PSWCHECK, SIZE_SALT,
};
use crate::parsing::block::{BlockFlags, BlockType};
use crate::parsing::extra::EXTRA_ENCRYPTION;
use crate::parsing::signature::RAR5_SIGNATURE;
use crate::parsing::vint::encode_into;
use aes::Aes256;
use cbc::cipher::{block_padding::NoPadding, BlockEncryptMut, KeyIvInit};

/// One block; area flags and sizes follow from what is set.
#[derive(Debug, Clone)]
pub struct BlockBuilder {
    block_type: BlockType,
    body: Vec<u8>,
    extra: Vec<u8>,
    data: Vec<u8>,
}

impl BlockBuilder {
    pub fn new(block_type: BlockType) -> Self {
        Self {
            block_type,
            body: Vec::new(),
            extra: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn body(mut self, body: &[u8]) -> Self {
        self.body = body.to_vec();
        self
    }

    pub fn extra(mut self, extra: &[u8]) -> Self {
        self.extra = extra.to_vec();
        self
    }

    pub fn data(mut self, data: &[u8]) -> Self {
        self.data = data.to_vec();
        self
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        let mut flags = 0;
        if !self.extra.is_empty() {
            flags |= BlockFlags::EXTRA_AREA;
        }
        if !self.data.is_empty() {
            flags |= BlockFlags::DATA_AREA;
        }

        let mut content = Vec::new();
        encode_into(self.block_type.code(), &mut content);
        encode_into(flags, &mut content);
        if !self.extra.is_empty() {
            encode_into(self.extra.len() as u64, &mut content);
        }
        if !self.data.is_empty() {
            encode_into(self.data.len() as u64, &mut content);
        }
        content.extend_from_slice(&self.body);
        content.extend_from_slice(&self.extra);

        // CRC is never verified
        out.extend_from_slice(&[0, 0, 0, 0]);
        encode_into(content.len() as u64, out);
        out.extend_from_slice(&content);
        out.extend_from_slice(&self.data);
    }
}

/// A signature followed by blocks.
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    bytes: Vec<u8>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            bytes: RAR5_SIGNATURE.to_vec(),
        }
    }

    pub fn block(mut self, block: BlockBuilder) -> Self {
        block.write_to(&mut self.bytes);
        self
    }

    /// Append an end-of-archive block.
    pub fn end(self) -> Self {
        self.block(BlockBuilder::new(BlockType::EndOfArchive).body(&[0x00]))
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}

/// AES-256-CBC encrypt whole blocks.
pub fn encrypt_blocks(key: &[u8; KEY_LEN], iv: &[u8; SIZE_INITV], plaintext: &[u8]) -> Vec<u8> {
    let mut buffer = plaintext.to_vec();
    let len = buffer.len();
    cbc::Encryptor::<Aes256>::new_from_slices(key, iv)
        .unwrap()
        .encrypt_padded_mut::<NoPadding>(&mut buffer, len)
        .unwrap();
    buffer
}

/// Wrap a payload as an extra record.
pub fn extra_record(record_type: u64, payload: &[u8]) -> Vec<u8> {
    let mut typed = Vec::new();
    encode_into(record_type, &mut typed);
    typed.extend_from_slice(payload);

    let mut out = Vec::new();
    encode_into(typed.len() as u64, &mut out);
    out.extend_from_slice(&typed);
    out
}

/// Encryption record payload, optionally with the reserved byte.
pub fn encryption_payload(
    round_log: u8,
    salt: Option<[u8; SIZE_SALT]>,
    iv: Option<[u8; SIZE_INITV]>,
    check: Option<[u8; SIZE_PSWCHECK]>,
    reserved: bool,
) -> Vec<u8> {
    let mut flags = 0u64;
    if salt.is_some() {
        flags |= 0x01;
    }
    if iv.is_some() {
        flags |= 0x02;
    }

    let mut out = vec![0x00]; // kdf version
    if reserved {
        out.push(0x00);
    }
    encode_into(flags, &mut out);
    out.push(round_log);
    if let Some(salt) = salt {
        out.extend_from_slice(&salt);
    }
    if let Some(iv) = iv {
        out.extend_from_slice(&iv);
    }
    if let Some(check) = check {
        out.extend_from_slice(&check);
    }
    out
}

/// Archive encryption block body.
pub fn encryption_block_body(salt: [u8; SIZE_SALT], check: [u8; SIZE_PSWCHECK]) -> Vec<u8> {
    let mut body = vec![0x00];
    body.extend_from_slice(&salt);
    body.extend_from_slice(&check);
    body
}

/// File header fields with no optional fields set.
pub fn file_body(name: &str, unpacked: u64) -> Vec<u8> {
    let mut body = Vec::new();
    encode_into(0, &mut body); // file flags
    encode_into(unpacked, &mut body);
    encode_into(0x20, &mut body); // attributes
    encode_into(0, &mut body); // compression info
    encode_into(1, &mut body); // host OS
    encode_into(name.len() as u64, &mut body);
    body.extend_from_slice(name.as_bytes());
    body
}

pub const FIXTURE_SALT: [u8; SIZE_SALT] = [0x5A; SIZE_SALT];
pub const FIXTURE_IV: [u8; SIZE_INITV] = [
    0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF,
];
pub const FIXTURE_ROUND_LOG: u8 = 4;

/// Plaintext that classifies as a PNG.
pub fn png_plaintext() -> Vec<u8> {
    let mut plain = b"\x89PNG\r\n\x1a\n".to_vec();
    plain.extend_from_slice(b"\x00\x00\x00\x0dIHDR\x00\x00\x00\x10\x00\x00\x00\x10");
    plain.resize(32, 0x7F);
    plain
}

/// A single-file archive whose entry is encrypted under `password`.
///
/// Uses a small round exponent so tests stay fast. The check value, when
/// requested, is computed with the rounds `derivation` expects.
pub fn encrypted_archive(password: &str, derivation: CheckDerivation, with_check: bool) -> Vec<u8> {
    let key_rounds = 1u32 << FIXTURE_ROUND_LOG;
    let check_rounds = match derivation {
        CheckDerivation::Sha256Prefix => key_rounds,
        CheckDerivation::XorFold => key_rounds + CHECK_EXTRA_ROUNDS,
    };
    let check =
        with_check.then(|| derivation.compute(password.as_bytes(), &FIXTURE_SALT, check_rounds));
    encrypted_archive_with_check(password, check)
}

/// Like [`encrypted_archive`], with the stored check value given directly.
pub fn encrypted_archive_with_check(password: &str, check: Option<[u8; SIZE_PSWCHECK]>) -> Vec<u8> {
    let mut key = [0u8; KEY_LEN];
    derive_key(password.as_bytes(), &FIXTURE_SALT, 1u32 << FIXTURE_ROUND_LOG, &mut key);

    let plaintext = png_plaintext();
    let ciphertext = encrypt_blocks(&key, &FIXTURE_IV, &plaintext);

    let payload = encryption_payload(
        FIXTURE_ROUND_LOG,
        Some(FIXTURE_SALT),
        Some(FIXTURE_IV),
        check,
        false,
    );

    ArchiveBuilder::new()
        .block(BlockBuilder::new(BlockType::Main).body(&[0x00]))
        .block(
            BlockBuilder::new(BlockType::File)
                .body(&file_body("secret.png", plaintext.len() as u64))
                .extra(&extra_record(EXTRA_ENCRYPTION, &payload))
                .data(&ciphertext),
        )
        .end()
        .build()
}
