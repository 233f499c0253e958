// Copyright 2025 LiveKit, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! zlib streams seeded with the previous session description.
//!
//! Consecutive offers and answers of one session differ in a few lines, so
//! the server compresses each answer with the previously applied answer as
//! preset dictionary (and accepts offers compressed the same way against
//! the previous offer). Both sides must hold byte-identical dictionaries,
//! any mismatch is reported instead of producing a wrong description.

use std::string::FromUtf8Error;

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use thiserror::Error;

use super::Sdp;

pub const MAX_DECOMPRESSED_SDP_SIZE: usize = 1024 * 1024;

const MIN_OUTPUT_CHUNK: usize = 4 * 1024;

#[derive(Debug, Error)]
pub enum SdpCompressionError {
    #[error("compressed payload is empty")]
    EmptyPayload,
    #[error("payload requires a dictionary but no previous description is stored")]
    MissingDictionary,
    #[error("stored previous description does not match the payload dictionary")]
    DictionaryMismatch,
    #[error("corrupt payload: {0}")]
    Corrupt(String),
    #[error("payload ended before the end of the compressed stream")]
    Truncated,
    #[error("decompressed description exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("description is not valid utf-8: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),
    #[error("compression failed: {0}")]
    Compress(String),
}

/// Outgoing offer, as it should be placed on the subscribe frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdpOfferPayload {
    Plain(Sdp),
    Compressed(Vec<u8>),
}

/// Inflates a zlib stream, providing `dictionary` when the stream asks for
/// one.
///
/// The whole payload must be exactly one stream: trailing bytes, a short
/// stream or a checksum failure are all errors.
pub fn decompress_with_dictionary(
    payload: &[u8],
    dictionary: &[u8],
    max_size: usize,
) -> Result<Vec<u8>, SdpCompressionError> {
    if payload.is_empty() {
        return Err(SdpCompressionError::EmptyPayload);
    }

    let mut decoder = Decompress::new(true);
    let mut output =
        Vec::with_capacity((payload.len() * 4).max(MIN_OUTPUT_CHUNK).min(max_size.max(1)));
    let mut dictionary_set = false;

    loop {
        if output.len() == output.capacity() {
            if output.len() >= max_size {
                return Err(SdpCompressionError::TooLarge { limit: max_size });
            }
            let additional = output.capacity().max(MIN_OUTPUT_CHUNK).min(max_size - output.len());
            output.reserve_exact(additional);
        }

        let consumed = decoder.total_in() as usize;
        let produced = output.len();
        let status = match decoder.decompress_vec(
            &payload[consumed..],
            &mut output,
            FlushDecompress::Finish,
        ) {
            Ok(status) => status,
            Err(err) if err.needs_dictionary().is_some() => {
                if dictionary_set {
                    return Err(SdpCompressionError::Corrupt(err.to_string()));
                }
                if dictionary.is_empty() {
                    return Err(SdpCompressionError::MissingDictionary);
                }
                decoder
                    .set_dictionary(dictionary)
                    .map_err(|_| SdpCompressionError::DictionaryMismatch)?;
                dictionary_set = true;
                continue;
            }
            Err(err) => return Err(SdpCompressionError::Corrupt(err.to_string())),
        };

        if output.len() > max_size {
            return Err(SdpCompressionError::TooLarge { limit: max_size });
        }

        match status {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError => {
                let stalled = decoder.total_in() as usize == consumed && output.len() == produced;
                let input_done = decoder.total_in() as usize == payload.len();
                if (input_done || stalled) && output.len() < output.capacity() {
                    return Err(SdpCompressionError::Truncated);
                }
            }
        }
    }

    let total_in = decoder.total_in() as usize;
    if total_in != payload.len() {
        return Err(SdpCompressionError::Corrupt(format!(
            "{} trailing bytes after the end of the stream",
            payload.len() - total_in
        )));
    }

    Ok(output)
}

pub fn compress_with_dictionary(
    data: &[u8],
    dictionary: &[u8],
) -> Result<Vec<u8>, SdpCompressionError> {
    let mut encoder = Compress::new(Compression::default(), true);
    if !dictionary.is_empty() {
        encoder
            .set_dictionary(dictionary)
            .map_err(|err| SdpCompressionError::Compress(err.to_string()))?;
    }

    let mut output = Vec::with_capacity(data.len() / 2 + 64);
    loop {
        if output.len() == output.capacity() {
            output.reserve(output.capacity().max(MIN_OUTPUT_CHUNK));
        }
        let consumed = encoder.total_in() as usize;
        let status = encoder
            .compress_vec(&data[consumed..], &mut output, FlushCompress::Finish)
            .map_err(|err| SdpCompressionError::Compress(err.to_string()))?;
        if status == Status::StreamEnd {
            return Ok(output);
        }
    }
}

/// Turns the answer carried by a subscribe ack into text.
///
/// Without `compressed` the payload is the plain description and is only
/// checked for utf-8. Otherwise it is inflated against `previous_answer`.
pub fn decode_sdp_answer(
    payload: &[u8],
    previous_answer: &str,
    compressed: bool,
    max_size: usize,
) -> Result<Sdp, SdpCompressionError> {
    if !compressed {
        return Ok(Sdp::new(String::from_utf8(payload.to_vec())?));
    }

    let decompressed = decompress_with_dictionary(payload, previous_answer.as_bytes(), max_size)
        .map_err(|err| {
            log::error!("failed to decompress sdp answer ({} bytes): {}", payload.len(), err);
            err
        })?;
    Ok(Sdp::new(String::from_utf8(decompressed)?))
}

pub fn encode_sdp_offer(
    offer: &Sdp,
    previous_offer: Option<&Sdp>,
    server_supports_compression: bool,
) -> Result<SdpOfferPayload, SdpCompressionError> {
    if !server_supports_compression {
        return Ok(SdpOfferPayload::Plain(offer.clone()));
    }

    let dictionary = previous_offer.map(Sdp::as_str).unwrap_or_default();
    let compressed = compress_with_dictionary(offer.as_str().as_bytes(), dictionary.as_bytes())?;
    log::trace!("compressed sdp offer {} -> {} bytes", offer.as_str().len(), compressed.len());
    Ok(SdpOfferPayload::Compressed(compressed))
}
