//! Hardware sink over CPAL.
//!
//! CPAL pulls audio from a callback while the driver pushes blocking writes,
//! so a ring buffer sits between the two. A write blocks while the ring is
//! full. A callback that finds the ring short plays silence and flags an
//! underrun, which the next write reports.

use super::sink::{PcmSink, WriteError};
use crate::compat::{Arc, Condvar, Mutex};
use crate::config::HardwareParams;
use crate::lockfree::AtomicFlag;
use crate::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapProd, HeapRb};
use std::time::Duration;

/// Buffers of headroom in the ring between the driver and the device.
const RING_BUFFERS: usize = 2;

/// Wrapper to hold `cpal::Stream` in a `Send` context.
///
/// # Safety
/// `cpal::Stream` is `!Send` due to platform internals. The stream is only
/// touched from behind the driver's state lock.
struct StreamHandle(cpal::Stream);

unsafe impl Send for StreamHandle {}

#[derive(Default)]
struct Shared {
    underrun: AtomicFlag,
    lock: Mutex<()>,
    consumed: Condvar,
}

pub struct CpalSink {
    shared: Arc<Shared>,
    stream: Option<StreamHandle>,
    producer: Option<HeapProd<i16>>,
    params: Option<HardwareParams>,
}

impl CpalSink {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            stream: None,
            producer: None,
            params: None,
        }
    }

    pub fn list_devices() -> Result<Vec<String>> {
        cpal::default_host()
            .output_devices()?
            .map(|d| Ok(d.name()?))
            .collect()
    }
}

impl Default for CpalSink {
    fn default() -> Self {
        Self::new()
    }
}

/// The device named `name`, or the default device for `default` and ALSA
/// style `hw:N` names CPAL doesn't list.
fn find_device(name: &str) -> Result<cpal::Device> {
    let host = cpal::default_host();

    if name != "default" {
        for device in host.output_devices()? {
            if device.name()? == name {
                return Ok(device);
            }
        }
    }

    host.default_output_device()
        .ok_or_else(|| Error::LockedSoundcard(name.to_string()))
}

impl PcmSink for CpalSink {
    fn name(&self) -> &str {
        "cpal"
    }

    fn open(&mut self, params: &HardwareParams) -> Result<HardwareParams> {
        let device = find_device(&params.device)?;
        let config = cpal::StreamConfig {
            channels: params.channels,
            sample_rate: cpal::SampleRate(params.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(params.buffer_size as u32),
        };

        let (producer, mut consumer) =
            HeapRb::<i16>::new(params.samples_per_buffer() * RING_BUFFERS).split();
        let shared = Arc::clone(&self.shared);
        shared.underrun.set(false);

        let stream = device.build_output_stream(
            &config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    let read = consumer.pop_slice(data);
                    if read < data.len() {
                        data[read..].fill(0);
                        shared.underrun.set(true);
                    }
                }));
                if result.is_err() {
                    data.fill(0);
                }

                let _guard = shared.lock.lock();
                shared.consumed.notify_all();
            },
            |err| tracing::warn!(error = %err, "cpal stream error"),
            None,
        )?;
        stream.play()?;

        self.stream = Some(StreamHandle(stream));
        self.producer = Some(producer);
        self.params = Some(params.clone());
        Ok(params.clone())
    }

    fn write(&mut self, samples: &[i16]) -> core::result::Result<usize, WriteError> {
        let (Some(producer), Some(params)) = (self.producer.as_mut(), self.params.as_ref()) else {
            return Err(WriteError::Other("device not open".into()));
        };

        if self.shared.underrun.swap(false) {
            return Err(WriteError::Underrun);
        }

        let timeout = params.buffer_duration() * 4;
        let mut written = 0;
        while written < samples.len() {
            written += producer.push_slice(&samples[written..]);
            if written == samples.len() {
                break;
            }

            let mut guard = self.shared.lock.lock();
            if producer.is_full()
                && self
                    .shared
                    .consumed
                    .wait_for(&mut guard, timeout)
                    .timed_out()
            {
                return Err(WriteError::Suspended);
            }
        }

        Ok(written / params.channels.max(1) as usize)
    }

    fn prepare(&mut self) -> Result<()> {
        self.shared.underrun.set(false);
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        match &self.stream {
            Some(stream) => Ok(stream.0.play()?),
            None => Err(Error::BrokenConfiguration("stream not open".into())),
        }
    }

    fn drain(&mut self) {
        let (Some(producer), Some(params)) = (self.producer.as_ref(), self.params.as_ref()) else {
            return;
        };
        let deadline = params.buffer_duration() * RING_BUFFERS as u32 * 2;
        let step = Duration::from_millis(1);
        let mut waited = Duration::ZERO;
        while !producer.is_empty() && waited < deadline {
            std::thread::sleep(step);
            waited += step;
        }
    }

    fn close(&mut self) {
        self.stream = None;
        self.producer = None;
        self.params = None;
    }
}
