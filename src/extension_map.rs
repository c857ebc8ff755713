//! The per-file extension map.

use std::collections::HashMap;

use nom::multi::many_m_n;
use nom::number::complete::le_u16;
use nom::IResult;

use crate::error::NfdumpError;

/// Highest legal extension id; anything above this is corruption.
pub const MAX_EXTENSION_ID: u16 = 48;

/// DoS guard on the number of extension ids a single map entry may list.
/// Far above anything a legitimate file produces.
pub const MAX_EXT_LIST_LEN: usize = 64;

/// `mapID -> ordered extension id list`, mutated in place as the file is read.
#[derive(Debug, Clone)]
pub struct ExtensionMap {
    maps: HashMap<u16, Vec<u16>>,
    max_list_len: usize,
}

impl Default for ExtensionMap {
    fn default() -> Self {
        Self {
            maps: HashMap::new(),
            max_list_len: MAX_EXT_LIST_LEN,
        }
    }
}

impl ExtensionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map with a caller-chosen DoS guard, overriding the default
    /// (mirrors `DecoderOptions::max_ext_list_len`).
    pub fn with_max_list_len(max_list_len: usize) -> Self {
        Self {
            maps: HashMap::new(),
            max_list_len,
        }
    }

    pub fn get(&self, map_id: u16) -> Option<&[u16]> {
        self.maps.get(&map_id).map(Vec::as_slice)
    }

    /// Decodes a type-2 record body (everything after the 4-byte record
    /// header) and replaces the map entry for the id it carries.
    pub fn update_from_record(&mut self, body: &[u8]) -> Result<(), NfdumpError> {
        let (_, (map_id, ids)) =
            parse_ext_map_body(body).map_err(|_| NfdumpError::CorruptRecordSize)?;
        if ids.len() > self.max_list_len {
            return Err(NfdumpError::CorruptExtMapID {
                id: ids.len() as u16,
                map_id,
            });
        }
        // Trailing zero ids are version-1 padding to 32-bit alignment; drop
        // them before validating, since 0 itself is not a legal extension id.
        let trimmed: Vec<u16> = ids.into_iter().take_while(|&id| id != 0).collect();
        for &id in &trimmed {
            if id > MAX_EXTENSION_ID {
                return Err(NfdumpError::CorruptExtMapID { id, map_id });
            }
        }
        self.maps.insert(map_id, trimmed);
        Ok(())
    }
}

fn parse_ext_map_body(body: &[u8]) -> IResult<&[u8], (u16, Vec<u16>)> {
    let (rest, map_id) = le_u16(body)?;
    let (rest, ext_size) = le_u16(rest)?;
    if ext_size == 0 {
        // Caller translates this into UnsupportedExtMapV2 after checking it
        // explicitly; signal failure here so the combinator short-circuits.
        return Err(nom::Err::Failure(nom::error::Error::new(
            rest,
            nom::error::ErrorKind::Verify,
        )));
    }
    let count = rest.len() / 2;
    let (rest, ids) = many_m_n(count, count, le_u16)(rest)?;
    Ok((rest, (map_id, ids)))
}

/// Peeks at whether a type-2 record body signals the unsupported v2 layout
/// (`extSize == 0`) without fully parsing it.
pub fn is_ext_map_v2(body: &[u8]) -> Result<bool, NfdumpError> {
    let (rest, _map_id) = le_u16::<_, nom::error::Error<&[u8]>>(body)
        .map_err(|_| NfdumpError::CorruptRecordSize)?;
    let (_, ext_size) = le_u16::<_, nom::error::Error<&[u8]>>(rest)
        .map_err(|_| NfdumpError::CorruptRecordSize)?;
    Ok(ext_size == 0)
}
