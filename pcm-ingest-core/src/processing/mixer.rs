use parking_lot::Mutex;

use crate::models::error::{IngestError, Result};
use crate::models::format::AudioFormatDescriptor;
use crate::traits::pcm_stream::PcmStream;

const BYTES_PER_SAMPLE: usize = 4;

/// Handle to an input of a [`MixerBus`], returned by `add_input`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputId(u64);

/// Sums any number of 32-bit float streams into one, keeping every input at the
/// bus position.
///
/// Inputs and position sit behind one lock, so inputs may be added or removed from
/// another thread while a read is in flight. An input that runs out before the bus
/// does contributes silence.
pub struct MixerBus {
    inner: Mutex<BusInner>,
}

struct BusInner {
    inputs: Vec<(InputId, Box<dyn PcmStream>)>,
    next_id: u64,
    format: AudioFormatDescriptor,
    length: u64,
    position: u64,
    auto_stop: bool,
    scratch: Vec<u8>,
}

impl MixerBus {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BusInner {
                inputs: Vec::new(),
                next_id: 0,
                format: AudioFormatDescriptor::ieee_float(44100, 2),
                length: 0,
                position: 0,
                auto_stop: true,
                scratch: Vec::new(),
            }),
        }
    }

    /// Add an input, seeking it to the bus position.
    ///
    /// The first input fixes the bus sample rate and channel count; later inputs must
    /// match them. Every input must be 32-bit IEEE float.
    pub fn add_input(&self, mut stream: Box<dyn PcmStream>) -> Result<InputId> {
        let format = stream.format();
        if !format.is_ieee_float_32() {
            return Err(IngestError::UnsupportedFormat(format!(
                "mixer inputs must be 32-bit IEEE float, got {:?} {} bit",
                format.encoding(),
                format.bits_per_sample()
            )));
        }

        let mut inner = self.inner.lock();
        if inner.inputs.is_empty() {
            inner.format = AudioFormatDescriptor::ieee_float(format.sample_rate(), format.channels());
        } else if format.sample_rate() != inner.format.sample_rate() || format.channels() != inner.format.channels() {
            return Err(IngestError::InvalidOperation(format!(
                "input is {} Hz, {} ch but the bus is {} Hz, {} ch",
                format.sample_rate(),
                format.channels(),
                inner.format.sample_rate(),
                inner.format.channels()
            )));
        }

        stream.set_position(inner.position.min(stream.length()))?;
        inner.length = inner.length.max(stream.length());

        let id = InputId(inner.next_id);
        inner.next_id += 1;
        inner.inputs.push((id, stream));
        log::debug!("mixer input {:?} added, bus length {} bytes", id, inner.length);
        Ok(id)
    }

    /// Remove an input and hand it back. The bus length shrinks to the longest remaining input.
    pub fn remove_input(&self, id: InputId) -> Option<Box<dyn PcmStream>> {
        let mut inner = self.inner.lock();
        let at = inner.inputs.iter().position(|(input, _)| *input == id)?;
        let (_, stream) = inner.inputs.remove(at);
        inner.length = inner.inputs.iter().map(|(_, s)| s.length()).max().unwrap_or(0);
        Some(stream)
    }

    pub fn input_count(&self) -> usize {
        self.inner.lock().inputs.len()
    }

    /// When set, reads stop at the bus length instead of producing endless silence.
    pub fn set_auto_stop(&self, auto_stop: bool) {
        self.inner.lock().auto_stop = auto_stop;
    }

    pub fn auto_stop(&self) -> bool {
        self.inner.lock().auto_stop
    }

    pub fn format(&self) -> AudioFormatDescriptor {
        self.inner.lock().format.clone()
    }

    pub fn length(&self) -> u64 {
        self.inner.lock().length
    }

    pub fn position(&self) -> u64 {
        self.inner.lock().position
    }

    /// Move the bus, clamped to its length, and every input, clamped to its own.
    pub fn set_position(&self, position: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        let position = position.min(inner.length);
        for (_, input) in inner.inputs.iter_mut() {
            let clamped = position.min(input.length());
            input.set_position(clamped)?;
        }
        inner.position = position;
        Ok(())
    }

    /// Fill `buf` with the sum of all inputs and return the bytes produced.
    ///
    /// `buf.len()` must be a whole number of frames.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let frame_bytes = BYTES_PER_SAMPLE * inner.format.channels() as usize;
        if frame_bytes == 0 || buf.len() % frame_bytes != 0 {
            return Err(IngestError::InvalidArgument(format!(
                "read of {} bytes is not a multiple of the {} byte frame",
                buf.len(),
                frame_bytes
            )));
        }

        let mut count = buf.len();
        if inner.auto_stop {
            let remaining = inner.length.saturating_sub(inner.position);
            count = count.min(remaining as usize);
            count -= count % frame_bytes;
        }

        let out = &mut buf[..count];
        out.fill(0);
        if inner.scratch.len() < count {
            inner.scratch.resize(count, 0);
        }
        let scratch = &mut inner.scratch[..count];

        for (_, input) in inner.inputs.iter_mut() {
            if input.remaining() >= count as u64 {
                let read = read_full(input.as_mut(), scratch)?;
                accumulate(out, &scratch[..read]);
            } else {
                let advanced = input.position() + count as u64;
                input.set_position(advanced)?;
            }
        }

        inner.position += count as u64;
        log::trace!("mixed {} bytes from {} inputs", count, inner.inputs.len());
        Ok(count)
    }
}

impl Default for MixerBus {
    fn default() -> Self {
        Self::new()
    }
}

impl PcmStream for MixerBus {
    fn format(&self) -> AudioFormatDescriptor {
        MixerBus::format(self)
    }

    fn length(&self) -> u64 {
        MixerBus::length(self)
    }

    fn position(&self) -> u64 {
        MixerBus::position(self)
    }

    fn set_position(&mut self, position: u64) -> Result<()> {
        MixerBus::set_position(self, position)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        MixerBus::read(self, buf)
    }
}

fn read_full(stream: &mut dyn PcmStream, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Add little-endian f32 samples from `src` into `dst` in place.
fn accumulate(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.chunks_exact_mut(BYTES_PER_SAMPLE).zip(src.chunks_exact(BYTES_PER_SAMPLE)) {
        let sum = f32::from_le_bytes([d[0], d[1], d[2], d[3]]) + f32::from_le_bytes([s[0], s[1], s[2], s[3]]);
        d.copy_from_slice(&sum.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use approx::assert_relative_eq;

    use super::*;
    use crate::storage::raw_stream::RawPcmStream;

    fn stereo(frames: usize, base: f32) -> Box<dyn PcmStream> {
        let samples: Vec<f32> = (0..frames * 2).map(|i| base + i as f32 * 0.01).collect();
        Box::new(RawPcmStream::from_f32(44100, 2, &samples))
    }

    fn to_f32(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn empty_bus_reports_float_stereo() {
        let bus = MixerBus::new();
        assert_eq!(bus.format(), AudioFormatDescriptor::ieee_float(44100, 2));
        assert_eq!(bus.length(), 0);
        assert!(bus.auto_stop());
    }

    #[test]
    fn shorter_input_falls_silent_after_it_ends() {
        let bus = MixerBus::new();
        bus.add_input(stereo(4, 0.1)).unwrap();
        bus.add_input(stereo(8, 0.5)).unwrap();
        assert_eq!(bus.length(), 8 * 8);

        let mut first = [0u8; 32];
        let mut second = [0u8; 32];
        assert_eq!(bus.read(&mut first).unwrap(), 32);
        assert_eq!(bus.read(&mut second).unwrap(), 32);
        assert_eq!(bus.position(), 64);

        let first = to_f32(&first);
        for (i, sample) in first.iter().enumerate() {
            let expected = (0.1 + i as f32 * 0.01) + (0.5 + i as f32 * 0.01);
            assert_relative_eq!(*sample, expected, epsilon = 1e-6);
        }

        let second = to_f32(&second);
        for (i, sample) in second.iter().enumerate() {
            let expected = 0.5 + (i + 8) as f32 * 0.01;
            assert_relative_eq!(*sample, expected, epsilon = 1e-6);
        }

        // Auto-stop: nothing past the longest input.
        let mut tail = [0u8; 32];
        assert_eq!(bus.read(&mut tail).unwrap(), 0);
    }

    #[test]
    fn auto_stop_clamps_the_final_read() {
        let bus = MixerBus::new();
        bus.add_input(stereo(3, 0.0)).unwrap();

        let mut buf = [0xffu8; 64];
        assert_eq!(bus.read(&mut buf).unwrap(), 24);
        assert_eq!(bus.position(), 24);
    }

    #[test]
    fn without_auto_stop_reads_continue_as_silence() {
        let bus = MixerBus::new();
        bus.add_input(stereo(2, 0.3)).unwrap();
        bus.set_auto_stop(false);
        bus.set_position(16).unwrap();

        let mut buf = [0xffu8; 32];
        assert_eq!(bus.read(&mut buf).unwrap(), 32);
        assert!(to_f32(&buf).iter().all(|s| *s == 0.0));
        assert_eq!(bus.position(), 48);
    }

    #[test]
    fn removing_the_longer_input_shrinks_the_bus() {
        let bus = MixerBus::new();
        let short = bus.add_input(stereo(4, 0.0)).unwrap();
        let long = bus.add_input(stereo(8, 0.0)).unwrap();
        assert_eq!(bus.length(), 64);

        let removed = bus.remove_input(long).unwrap();
        assert_eq!(removed.length(), 64);
        assert_eq!(bus.length(), 32);
        assert_eq!(bus.input_count(), 1);

        assert!(bus.remove_input(long).is_none());
        bus.remove_input(short).unwrap();
        assert_eq!(bus.length(), 0);
    }

    #[test]
    fn misaligned_read_is_an_argument_error() {
        let bus = MixerBus::new();
        bus.add_input(stereo(4, 0.0)).unwrap();

        let mut buf = [0u8; 12];
        let err = bus.read(&mut buf).unwrap_err();
        assert!(matches!(err, IngestError::InvalidArgument(_)));
        assert_eq!(bus.position(), 0);
    }

    #[test]
    fn mismatched_input_is_rejected() {
        let bus = MixerBus::new();
        bus.add_input(stereo(4, 0.0)).unwrap();

        let mono = Box::new(RawPcmStream::from_f32(44100, 1, &[0.0; 4]));
        assert!(matches!(bus.add_input(mono), Err(IngestError::InvalidOperation(_))));

        let other_rate = Box::new(RawPcmStream::from_f32(48000, 2, &[0.0; 4]));
        assert!(matches!(bus.add_input(other_rate), Err(IngestError::InvalidOperation(_))));
        assert_eq!(bus.input_count(), 1);
    }

    #[test]
    fn integer_pcm_is_rejected() {
        let bus = MixerBus::new();
        let pcm = Box::new(RawPcmStream::new(AudioFormatDescriptor::pcm(44100, 16, 2), vec![0; 16]));
        assert!(matches!(bus.add_input(pcm), Err(IngestError::UnsupportedFormat(_))));
    }

    #[test]
    fn first_input_fixes_the_format() {
        let bus = MixerBus::new();
        bus.add_input(Box::new(RawPcmStream::from_f32(48000, 1, &[0.0; 4]))).unwrap();
        assert_eq!(bus.format(), AudioFormatDescriptor::ieee_float(48000, 1));

        let mut buf = [0u8; 6];
        assert!(matches!(bus.read(&mut buf), Err(IngestError::InvalidArgument(_))));
    }

    #[test]
    fn set_position_clamps_bus_and_inputs() {
        let bus = MixerBus::new();
        let short = bus.add_input(stereo(2, 0.0)).unwrap();
        bus.add_input(stereo(8, 0.0)).unwrap();

        bus.set_position(40).unwrap();
        assert_eq!(bus.position(), 40);
        assert_eq!(bus.remove_input(short).unwrap().position(), 16);

        bus.set_position(1000).unwrap();
        assert_eq!(bus.position(), 64);
    }

    #[test]
    fn added_input_starts_at_bus_position() {
        let bus = MixerBus::new();
        bus.add_input(stereo(8, 0.0)).unwrap();
        bus.set_position(16).unwrap();

        let late = bus.add_input(stereo(8, 1.0)).unwrap();
        assert_eq!(bus.remove_input(late).unwrap().position(), 16);
    }

    #[test]
    fn inputs_can_change_while_reading() {
        let bus = Arc::new(MixerBus::new());
        bus.add_input(stereo(1024, 0.0)).unwrap();

        let adder = {
            let bus = Arc::clone(&bus);
            thread::spawn(move || {
                for _ in 0..16 {
                    let id = bus.add_input(stereo(512, 0.0)).unwrap();
                    bus.remove_input(id).unwrap();
                }
            })
        };

        let mut buf = [0u8; 64];
        let mut total = 0;
        while total < 1024 * 8 {
            total += bus.read(&mut buf).unwrap();
        }
        adder.join().unwrap();
        assert_eq!(bus.position(), 1024 * 8);
    }

    #[test]
    fn bus_is_itself_a_stream() {
        let inner = MixerBus::new();
        inner.add_input(stereo(4, 0.25)).unwrap();

        let outer = MixerBus::new();
        outer.add_input(Box::new(inner)).unwrap();
        outer.add_input(stereo(4, 0.25)).unwrap();

        let mut buf = [0u8; 32];
        assert_eq!(outer.read(&mut buf).unwrap(), 32);
        assert_relative_eq!(to_f32(&buf)[0], 0.5, epsilon = 1e-6);
    }
}
