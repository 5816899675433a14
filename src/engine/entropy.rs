//! Adaptive range coding (coder levels 2 and 3)
//!
//! A carry-propagating range coder over the 257-symbol MTF alphabet. The
//! frequency model adapts as symbols are coded; levels differ only in how
//! fast it adapts and how many contexts it keeps.

use crate::engine::mtf::ALPHABET;
use crate::engine::try_with_capacity;
use crate::error::BscError;

const TOP: u32 = 1 << 24;

/// Adaptation parameters for the frequency model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelParams {
    pub increment: u32,
    /// Statistics are halved once the total passes this. Must stay at or
    /// below 2^16 to keep the coder precise.
    pub limit: u32,
    /// Models selected by the class of the previous symbol.
    pub contexts: usize,
}

impl ModelParams {
    pub const ADAPTIVE: ModelParams = ModelParams {
        increment: 24,
        limit: 1 << 16,
        contexts: 3,
    };

    pub const FAST: ModelParams = ModelParams {
        increment: 32,
        limit: 1 << 13,
        contexts: 1,
    };

    fn context_of(&self, prev: u16) -> usize {
        if self.contexts == 1 {
            return 0;
        }
        match prev {
            0 | 1 => 0,
            2 | 3 => 1,
            _ => 2,
        }
    }
}

struct FrequencyModel {
    freq: [u32; ALPHABET],
    total: u32,
    increment: u32,
    limit: u32,
}

impl FrequencyModel {
    fn new(params: &ModelParams) -> Self {
        Self {
            freq: [1; ALPHABET],
            total: ALPHABET as u32,
            increment: params.increment,
            limit: params.limit,
        }
    }

    fn start_of(&self, symbol: u16) -> u32 {
        self.freq[..symbol as usize].iter().sum()
    }

    /// Symbol whose interval contains `target`, with its start.
    fn find(&self, target: u32) -> (u16, u32) {
        let mut start = 0u32;
        for (sym, &f) in self.freq.iter().enumerate() {
            if target < start + f {
                return (sym as u16, start);
            }
            start += f;
        }
        // target < total always holds
        ((ALPHABET - 1) as u16, start - self.freq[ALPHABET - 1])
    }

    fn update(&mut self, symbol: u16) {
        self.freq[symbol as usize] += self.increment;
        self.total += self.increment;
        if self.total > self.limit {
            self.total = 0;
            for f in self.freq.iter_mut() {
                *f = (*f + 1) / 2;
                self.total += *f;
            }
        }
    }
}

struct RangeEncoder {
    low: u64,
    range: u32,
    cache: u8,
    cache_size: u64,
    out: Vec<u8>,
}

impl RangeEncoder {
    fn new(out: Vec<u8>) -> Self {
        Self {
            low: 0,
            range: u32::MAX,
            cache: 0,
            cache_size: 1,
            out,
        }
    }

    fn shift_low(&mut self) {
        if (self.low as u32) < 0xFF00_0000 || (self.low >> 32) != 0 {
            let carry = (self.low >> 32) as u8;
            let mut temp = self.cache;
            loop {
                self.out.push(temp.wrapping_add(carry));
                temp = 0xFF;
                self.cache_size -= 1;
                if self.cache_size == 0 {
                    break;
                }
            }
            self.cache = (self.low >> 24) as u8;
        }
        self.cache_size += 1;
        self.low = (self.low & 0x00FF_FFFF) << 8;
    }

    fn encode(&mut self, start: u32, size: u32, total: u32) {
        self.range /= total;
        self.low += u64::from(start) * u64::from(self.range);
        self.range *= size;
        while self.range < TOP {
            self.range <<= 8;
            self.shift_low();
        }
    }

    fn finish(mut self) -> Vec<u8> {
        for _ in 0..5 {
            self.shift_low();
        }
        self.out
    }
}

struct RangeDecoder<'a> {
    code: u32,
    range: u32,
    input: &'a [u8],
    pos: usize,
}

impl<'a> RangeDecoder<'a> {
    fn new(input: &'a [u8]) -> Result<Self, BscError> {
        let mut decoder = Self {
            code: 0,
            range: u32::MAX,
            input,
            pos: 0,
        };
        for _ in 0..5 {
            let byte = decoder.next_byte()?;
            decoder.code = (decoder.code << 8) | u32::from(byte);
        }
        Ok(decoder)
    }

    fn next_byte(&mut self) -> Result<u8, BscError> {
        let byte = *self.input.get(self.pos).ok_or(BscError::UnexpectedEob)?;
        self.pos += 1;
        Ok(byte)
    }

    fn target(&mut self, total: u32) -> u32 {
        self.range /= total;
        (self.code / self.range).min(total - 1)
    }

    fn consume(&mut self, start: u32, size: u32) -> Result<(), BscError> {
        self.code = self.code.wrapping_sub(start.wrapping_mul(self.range));
        self.range *= size;
        while self.range < TOP {
            self.code = (self.code << 8) | u32::from(self.next_byte()?);
            self.range <<= 8;
        }
        Ok(())
    }
}

pub fn encode(symbols: &[u16], params: &ModelParams) -> Result<Vec<u8>, BscError> {
    let mut out = try_with_capacity(symbols.len() / 2 + 16)?;
    out.extend_from_slice(&(symbols.len() as u32).to_le_bytes());

    let mut models: Vec<FrequencyModel> = (0..params.contexts).map(|_| FrequencyModel::new(params)).collect();
    let mut encoder = RangeEncoder::new(out);
    let mut prev = 0u16;
    for &sym in symbols {
        let model = &mut models[params.context_of(prev)];
        let start = model.start_of(sym);
        encoder.encode(start, model.freq[sym as usize], model.total);
        model.update(sym);
        prev = sym;
    }
    Ok(encoder.finish())
}

/// Decodes at most `max_symbols` symbols; a larger stored count is corrupt.
pub fn decode(payload: &[u8], params: &ModelParams, max_symbols: usize) -> Result<Vec<u16>, BscError> {
    if payload.len() < 4 {
        return Err(BscError::UnexpectedEob);
    }
    let count = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
    if count > max_symbols {
        return Err(BscError::DataCorrupt(format!("{} coded symbols in a {} byte block", count, max_symbols)));
    }

    let mut models: Vec<FrequencyModel> = (0..params.contexts).map(|_| FrequencyModel::new(params)).collect();
    let mut decoder = RangeDecoder::new(&payload[4..])?;
    let mut symbols = try_with_capacity(count)?;
    let mut prev = 0u16;
    for _ in 0..count {
        let model = &mut models[params.context_of(prev)];
        let target = decoder.target(model.total);
        let (sym, start) = model.find(target);
        decoder.consume(start, model.freq[sym as usize])?;
        model.update(sym);
        symbols.push(sym);
        prev = sym;
    }

    if decoder.pos != decoder.input.len() {
        return Err(BscError::DataCorrupt("trailing range coder data".into()));
    }
    Ok(symbols)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skewed(len: usize) -> Vec<u16> {
        (0..len as u32)
            .map(|i| match i.wrapping_mul(2654435761) % 100 {
                0..=59 => 0,
                60..=79 => 1,
                80..=94 => 2,
                n => (n as u16) + 100,
            })
            .collect()
    }

    #[test]
    fn test_roundtrip_both_models() {
        let symbols = skewed(20_000);
        for params in [ModelParams::ADAPTIVE, ModelParams::FAST] {
            let payload = encode(&symbols, &params).unwrap();
            assert_eq!(decode(&payload, &params, symbols.len()).unwrap(), symbols);
        }
    }

    #[test]
    fn test_skewed_input_compresses() {
        let symbols = skewed(50_000);
        let payload = encode(&symbols, &ModelParams::ADAPTIVE).unwrap();
        // Raw symbols need at least a byte each.
        assert!(payload.len() < symbols.len() / 3);
    }

    #[test]
    fn test_every_symbol() {
        let symbols: Vec<u16> = (0..ALPHABET as u16).chain((0..ALPHABET as u16).rev()).collect();
        let payload = encode(&symbols, &ModelParams::FAST).unwrap();
        assert_eq!(decode(&payload, &ModelParams::FAST, symbols.len()).unwrap(), symbols);
    }

    #[test]
    fn test_carry_propagation() {
        // Long runs of the most probable symbol push `low` toward carries.
        let mut symbols = vec![0u16; 100_000];
        symbols.extend([256u16, 255, 256, 0, 0, 256]);
        let payload = encode(&symbols, &ModelParams::ADAPTIVE).unwrap();
        assert_eq!(decode(&payload, &ModelParams::ADAPTIVE, symbols.len()).unwrap(), symbols);
    }

    #[test]
    fn test_empty() {
        let payload = encode(&[], &ModelParams::ADAPTIVE).unwrap();
        assert_eq!(payload.len(), 4 + 5);
        assert!(decode(&payload, &ModelParams::ADAPTIVE, 0).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_bad_payloads() {
        let symbols = skewed(1000);
        let payload = encode(&symbols, &ModelParams::FAST).unwrap();
        assert!(matches!(
            decode(&payload, &ModelParams::FAST, 10),
            Err(BscError::DataCorrupt(_))
        ));
        assert!(decode(&payload[..payload.len() - 3], &ModelParams::FAST, symbols.len()).is_err());
    }
}
