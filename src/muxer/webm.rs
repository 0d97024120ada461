//! WebM container muxer

use super::MuxerConfig;
use crate::encoder::Packet;
use crate::{Error, Result};
use std::io::Write;

/// Longest cluster span before a new cluster is forced; block timecodes are i16
const MAX_CLUSTER_SPAN_MS: u64 = 30_000;

/// WebM muxer using simple EBML writing, streaming into any writer
pub struct WebmMuxer<W: Write> {
    writer: W,
    config: MuxerConfig,
    cluster_start: u64,
    cluster_open: bool,
    frame_index: u64,
}

impl<W: Write> WebmMuxer<W> {
    pub fn new(writer: W, config: MuxerConfig) -> Result<Self> {
        if config.fps == 0 {
            return Err(Error::Mux("frame rate must be non-zero".to_string()));
        }

        let mut muxer = Self {
            writer,
            config,
            cluster_start: 0,
            cluster_open: false,
            frame_index: 0,
        };

        muxer.write_header()?;

        Ok(muxer)
    }

    /// Write one video packet; packets are assumed to be in presentation order
    pub fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        let timecode = self.frame_index * 1000 / self.config.fps as u64;

        // Start a new cluster on keyframes, or before the relative timecode overflows
        let span = timecode - self.cluster_start;
        if !self.cluster_open
            || (packet.is_keyframe && timecode > self.cluster_start)
            || span > MAX_CLUSTER_SPAN_MS
        {
            self.start_cluster(timecode)?;
        }

        self.write_simple_block(packet, timecode)?;
        self.frame_index += 1;

        Ok(())
    }

    /// Flush and hand back the writer
    pub fn finalize(mut self) -> Result<W> {
        self.writer.flush().map_err(Error::Io)?;
        Ok(self.writer)
    }

    fn write_header(&mut self) -> Result<()> {
        // EBML Header
        self.write_ebml_element(0x1A45DFA3, &create_ebml_header())?;

        // Segment (unknown size)
        self.write_ebml_id(0x18538067)?;
        self.write_ebml_size_unknown()?;

        // Segment Info
        let info = self.create_segment_info();
        self.write_ebml_element(0x1549A966, &info)?;

        // Tracks
        let tracks = encode_ebml_element(0xAE, &self.create_track_entry());
        self.write_ebml_element(0x1654AE6B, &tracks)?;

        Ok(())
    }

    fn create_segment_info(&self) -> Vec<u8> {
        let mut data = Vec::new();

        // TimestampScale = 1000000 (1ms)
        data.extend(encode_ebml_element(0x2AD7B1, &encode_uint(1_000_000)));
        // Duration, in TimestampScale units
        if let Some(duration_ms) = self.config.duration_ms {
            data.extend(encode_ebml_element(0x4489, &duration_ms.to_be_bytes()));
        }
        // MuxingApp
        data.extend(encode_ebml_element(0x4D80, b"tripreel"));
        // WritingApp
        data.extend(encode_ebml_element(0x5741, b"tripreel"));

        data
    }

    fn create_track_entry(&self) -> Vec<u8> {
        let mut data = Vec::new();

        // TrackNumber = 1
        data.extend(encode_ebml_element(0xD7, &[1]));
        // TrackUID = 1
        data.extend(encode_ebml_element(0x73C5, &encode_uint(1)));
        // TrackType = 1 (video)
        data.extend(encode_ebml_element(0x83, &[1]));
        // CodecID
        data.extend(encode_ebml_element(0x86, self.config.codec_id.as_bytes()));
        // CodecPrivate
        if let Some(private) = &self.config.codec_private {
            data.extend(encode_ebml_element(0x63A2, private));
        }
        // DefaultDuration in nanoseconds
        let frame_ns = 1_000_000_000u64 / self.config.fps as u64;
        data.extend(encode_ebml_element(0x23E383, &encode_uint(frame_ns)));
        // Video settings
        data.extend(encode_ebml_element(0xE0, &self.create_video_settings()));

        data
    }

    fn create_video_settings(&self) -> Vec<u8> {
        let mut data = Vec::new();

        // PixelWidth
        data.extend(encode_ebml_element(
            0xB0,
            &encode_uint(self.config.width as u64),
        ));
        // PixelHeight
        data.extend(encode_ebml_element(
            0xBA,
            &encode_uint(self.config.height as u64),
        ));

        data
    }

    fn start_cluster(&mut self, timecode: u64) -> Result<()> {
        // Cluster (unknown size for streaming)
        self.write_ebml_id(0x1F43B675)?;
        self.write_ebml_size_unknown()?;

        // Timestamp
        self.write_ebml_element(0xE7, &encode_uint(timecode))?;

        self.cluster_start = timecode;
        self.cluster_open = true;

        Ok(())
    }

    fn write_simple_block(&mut self, packet: &Packet, timecode: u64) -> Result<()> {
        let relative_timecode = (timecode - self.cluster_start) as i16;

        let mut block_data = Vec::with_capacity(packet.data.len() + 4);

        // Track number (EBML coded, track 1)
        block_data.push(0x81);
        // Relative timecode (big-endian i16)
        block_data.extend_from_slice(&relative_timecode.to_be_bytes());
        // Flags: keyframe if applicable
        block_data.push(if packet.is_keyframe { 0x80 } else { 0x00 });
        // Frame data
        block_data.extend(&packet.data);

        // SimpleBlock element
        self.write_ebml_element(0xA3, &block_data)
    }

    fn write_ebml_id(&mut self, id: u32) -> Result<()> {
        let bytes = encode_ebml_id(id);
        self.writer.write_all(&bytes).map_err(Error::Io)
    }

    fn write_ebml_size_unknown(&mut self) -> Result<()> {
        // Unknown size marker for streaming
        self.writer
            .write_all(&[0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF])
            .map_err(Error::Io)
    }

    fn write_ebml_element(&mut self, id: u32, data: &[u8]) -> Result<()> {
        let bytes = encode_ebml_element(id, data);
        self.writer.write_all(&bytes).map_err(Error::Io)
    }
}

fn create_ebml_header() -> Vec<u8> {
    let mut data = Vec::new();

    // EBMLVersion = 1
    data.extend(encode_ebml_element(0x4286, &[1]));
    // EBMLReadVersion = 1
    data.extend(encode_ebml_element(0x42F7, &[1]));
    // EBMLMaxIDLength = 4
    data.extend(encode_ebml_element(0x42F2, &[4]));
    // EBMLMaxSizeLength = 8
    data.extend(encode_ebml_element(0x42F3, &[8]));
    // DocType = "webm"
    data.extend(encode_ebml_element(0x4282, b"webm"));
    // DocTypeVersion = 4
    data.extend(encode_ebml_element(0x4287, &[4]));
    // DocTypeReadVersion = 2
    data.extend(encode_ebml_element(0x4285, &[2]));

    data
}

// EBML encoding helpers

/// Encode an EBML element ID.
///
/// IDs carry their own length marker in the leading bits, so the ID is
/// written with as many bytes as its value needs.
fn encode_ebml_id(id: u32) -> Vec<u8> {
    let len = match id {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    };
    id.to_be_bytes()[4 - len..].to_vec()
}

fn encode_ebml_size(size: u64) -> Vec<u8> {
    // A length of n bytes holds 7n value bits; all-ones is reserved
    for len in 1..=7u32 {
        let max = (1u64 << (7 * len)) - 1;
        if size < max {
            let marked = size | (1u64 << (7 * len));
            return marked.to_be_bytes()[8 - len as usize..].to_vec();
        }
    }

    let mut bytes = vec![0x01];
    bytes.extend_from_slice(&size.to_be_bytes()[1..]);
    bytes
}

fn encode_ebml_element(id: u32, data: &[u8]) -> Vec<u8> {
    let mut result = encode_ebml_id(id);
    result.extend(encode_ebml_size(data.len() as u64));
    result.extend(data);
    result
}

fn encode_uint(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take(7).take_while(|b| **b == 0).count();
    bytes[skip..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MuxerConfig {
        MuxerConfig {
            width: 64,
            height: 48,
            fps: 30,
            codec_id: "V_AV1",
            codec_private: Some(vec![0x81, 0x00, 0x0C, 0x00]),
            duration_ms: Some(1000.0),
        }
    }

    fn packet(is_keyframe: bool) -> Packet {
        Packet {
            data: vec![0xAA; 10],
            pts: 0,
            is_keyframe,
        }
    }

    #[test]
    fn test_encode_ebml_id_lengths() {
        assert_eq!(encode_ebml_id(0xA3), vec![0xA3]);
        assert_eq!(encode_ebml_id(0x4286), vec![0x42, 0x86]);
        assert_eq!(encode_ebml_id(0x2AD7B1), vec![0x2A, 0xD7, 0xB1]);
        assert_eq!(encode_ebml_id(0x1A45DFA3), vec![0x1A, 0x45, 0xDF, 0xA3]);
    }

    #[test]
    fn test_encode_ebml_size() {
        assert_eq!(encode_ebml_size(5), vec![0x85]);
        assert_eq!(encode_ebml_size(0x7F), vec![0x40, 0x7F]);
        assert_eq!(encode_ebml_size(300), vec![0x41, 0x2C]);
    }

    #[test]
    fn test_encode_uint_minimal() {
        assert_eq!(encode_uint(0), vec![0]);
        assert_eq!(encode_uint(1), vec![1]);
        assert_eq!(encode_uint(1_000_000), vec![0x0F, 0x42, 0x40]);
    }

    #[test]
    fn test_header_and_blocks_in_memory() {
        let mut muxer = WebmMuxer::new(Vec::new(), config()).unwrap();
        muxer.write_packet(&packet(true)).unwrap();
        muxer.write_packet(&packet(false)).unwrap();
        let bytes = muxer.finalize().unwrap();

        assert_eq!(&bytes[..4], &[0x1A, 0x45, 0xDF, 0xA3]);
        assert!(bytes.windows(4).any(|w| w == b"webm"));
        assert!(bytes.windows(5).any(|w| w == b"V_AV1"));
        // One cluster for a keyframe followed by a delta frame
        let clusters = bytes
            .windows(4)
            .filter(|w| *w == [0x1F, 0x43, 0xB6, 0x75])
            .count();
        assert_eq!(clusters, 1);
    }

    #[test]
    fn test_new_cluster_on_later_keyframe() {
        let mut muxer = WebmMuxer::new(Vec::new(), config()).unwrap();
        muxer.write_packet(&packet(true)).unwrap();
        muxer.write_packet(&packet(false)).unwrap();
        muxer.write_packet(&packet(true)).unwrap();
        let bytes = muxer.finalize().unwrap();

        let clusters = bytes
            .windows(4)
            .filter(|w| *w == [0x1F, 0x43, 0xB6, 0x75])
            .count();
        assert_eq!(clusters, 2);
    }
}
