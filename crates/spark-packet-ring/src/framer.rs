//! 报文帧头的编解码。
//!
//! # 帧格式（What）
//! ```text
//! +----------------+----------------+---------------------------+
//! | length: u32 BE | skip: u32 BE   | payload (length bytes)    |
//! +----------------+----------------+---------------------------+
//! ```
//! - `skip <= length`，消费方可见的负载是 `payload[skip..length]`；
//! - 帧头始终写在写游标处；负载可能因回绕落在竞技场起点，见 [`crate::arena`]。
//!
//! # 设计要点（How）
//! - 借助 `bytes::{Buf, BufMut}` 读写定宽整数，保持与 spark 编解码器一致的字节序处理方式；
//! - 所有越界检查都以 `Result<_, BoundsViolation>` 返回，是否重置缓冲交给引擎判断。

use core::ops::Range;

use bytes::{Buf, BufMut};

use crate::error::{BoundsViolation, RingError};

/// 帧头固定长度（两个大端 `u32`）。
pub const HEADER_LEN: usize = 8;

/// 单个报文负载的最大声明长度。
pub const MAX_PACKET_LEN: usize = u32::MAX as usize;

/// 已校验的报文帧头。
///
/// 只能通过 [`PacketHeader::new`] 或 [`PacketHeader::decode`] 构造，
/// 因此持有者总能假定 `skip <= length`。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketHeader {
    length: u32,
    skip: u32,
}

impl PacketHeader {
    /// 校验生产者声明的参数并构造帧头。
    pub fn new(length: usize, skip: usize) -> Result<Self, RingError> {
        if length > MAX_PACKET_LEN || skip > length {
            return Err(RingError::InvalidParameter { length, skip });
        }
        Ok(Self {
            length: length as u32,
            skip: skip as u32,
        })
    }

    /// 负载总长度（含需要丢弃的前导字节）。
    pub const fn length(&self) -> usize {
        self.length as usize
    }

    /// 需要丢弃的前导字节数。
    pub const fn skip(&self) -> usize {
        self.skip as usize
    }

    /// 消费方实际拿到的字节数。
    pub const fn payload_len(&self) -> usize {
        (self.length - self.skip) as usize
    }

    /// 帧头加负载在竞技场中占用的字节数。
    pub const fn framed_len(&self) -> usize {
        HEADER_LEN + self.length as usize
    }

    /// 将帧头写入 `arena[offset..offset + HEADER_LEN]`。
    pub fn encode(&self, arena: &mut [u8], offset: usize) -> Result<(), BoundsViolation> {
        let capacity = arena.len();
        let Some(window) = header_window(capacity, offset) else {
            return Err(BoundsViolation::new("encode_header", offset, HEADER_LEN, capacity));
        };
        let mut dst = &mut arena[window];
        dst.put_u32(self.length);
        dst.put_u32(self.skip);
        Ok(())
    }

    /// 从 `arena[offset..]` 解码并校验帧头。
    ///
    /// # 契约说明（What）
    /// - 帧头区间必须完整落在竞技场内；
    /// - 解码出的 `skip` 不得大于 `length`；
    /// - 任一条件不满足都返回 [`BoundsViolation`]，此时调用方应视游标为不可信。
    pub fn decode(arena: &[u8], offset: usize) -> Result<Self, BoundsViolation> {
        let capacity = arena.len();
        let Some(window) = header_window(capacity, offset) else {
            return Err(BoundsViolation::new("decode_header", offset, HEADER_LEN, capacity));
        };
        let mut src = &arena[window];
        let length = src.get_u32();
        let skip = src.get_u32();
        if skip > length {
            // skip 超过 length 时负载区间为负，记录 skip 作为越界长度。
            return Err(BoundsViolation::new(
                "header_skip",
                offset,
                skip as usize,
                capacity,
            ));
        }
        Ok(Self { length, skip })
    }

    /// 给定负载起点，计算消费方可见区间并确认其落在竞技场内。
    pub fn payload_range(
        &self,
        body_start: usize,
        capacity: usize,
    ) -> Result<Range<usize>, BoundsViolation> {
        let start = body_start.checked_add(self.skip());
        let end = body_start.checked_add(self.length());
        match (start, end) {
            (Some(start), Some(end)) if end <= capacity => Ok(start..end),
            _ => Err(BoundsViolation::new(
                "payload",
                body_start,
                self.length(),
                capacity,
            )),
        }
    }
}

fn header_window(capacity: usize, offset: usize) -> Option<Range<usize>> {
    let end = offset.checked_add(HEADER_LEN)?;
    (end <= capacity).then_some(offset..end)
}
