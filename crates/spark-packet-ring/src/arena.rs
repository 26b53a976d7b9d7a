//! 连续字节竞技场与读写游标运算。
//!
//! # 模块定位（Why）
//! - 只负责“字节放在哪里”：游标、剩余空间、回绕标记与线性化拷贝；
//! - 不包含任何容量策略，扩容、驱逐与紧急重置都由 [`crate::ring`] 结合
//!   [`crate::policy`] 决定。
//!
//! # 布局约定（What）
//! - 未回绕时有效数据位于 `[read, write)`；
//! - 回绕后有效数据分为尾段 `[read, wrap_mark)` 与头段 `[0, write)`，此时 `write < read`；
//! - 尾段剩余空间还够写帧头时，回绕报文的帧头留在尾段末尾、负载从 0 开始
//!   （[`WrapMark::SplitFrame`]）；连帧头都放不下时，整帧从 0 开始，尾部不足 8 字节的空隙弃用
//!   （[`WrapMark::WholeFrame`]）；
//! - 放置判断一律使用严格不等式，因此“有数据且 `write == read`”的歧义状态不会出现。

use core::ops::Range;

use crate::{
    error::BoundsViolation,
    framer::{HEADER_LEN, PacketHeader},
};

/// 尚未被读取方越过的回绕点。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WrapMark {
    /// 帧头在尾段末尾，负载从 0 开始；记录帧头结束位置。
    SplitFrame { header_end: usize },
    /// 整帧从 0 开始；记录被弃用空隙的起点，即回绕前的写游标。
    WholeFrame { gap_at: usize },
}

impl WrapMark {
    /// 尾段有效数据的结束位置。
    pub(crate) fn tail_end(self) -> usize {
        match self {
            Self::SplitFrame { header_end } => header_end,
            Self::WholeFrame { gap_at } => gap_at,
        }
    }
}

/// 一次写入的落点。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Placement {
    pub header_at: usize,
    pub body_at: usize,
    pub wrap: Option<WrapMark>,
}

/// 队首报文在竞技场中的位置，由 [`Arena::locate_next`] 纯计算得出。
///
/// 读取失败（例如目标缓冲不足）时不推进游标即可实现“无损回退”。
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct PacketSlot {
    pub header: PacketHeader,
    pub payload: Range<usize>,
    pub next_read: usize,
    pub consumes_wrap: bool,
}

#[derive(Debug)]
pub(crate) struct Arena {
    bytes: Box<[u8]>,
    read: usize,
    write: usize,
    wrap_mark: Option<WrapMark>,
}

impl Arena {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: vec![0u8; capacity].into_boxed_slice(),
            read: 0,
            write: 0,
            wrap_mark: None,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.bytes.len()
    }

    pub(crate) fn read_cursor(&self) -> usize {
        self.read
    }

    pub(crate) fn write_cursor(&self) -> usize {
        self.write
    }

    pub(crate) fn wrap_mark(&self) -> Option<WrapMark> {
        self.wrap_mark
    }

    /// 写游标之前可连续使用的字节数。
    pub(crate) fn space_at_head(&self) -> usize {
        if self.write < self.read {
            self.read - self.write
        } else {
            self.capacity() - self.write
        }
    }

    /// 读游标之前可复用的字节数；已有回绕时为 0。
    pub(crate) fn space_at_start(&self) -> usize {
        if self.write < self.read { 0 } else { self.read }
    }

    /// 有效数据的两个线性区段（尾段、头段）。
    pub(crate) fn segments(&self) -> Result<[Range<usize>; 2], BoundsViolation> {
        let capacity = self.capacity();
        if self.write >= self.read {
            if self.write > capacity {
                return Err(BoundsViolation::new("segments", self.read, self.write, capacity));
            }
            return Ok([self.read..self.write, 0..0]);
        }
        match self.wrap_mark.map(WrapMark::tail_end) {
            Some(end) if end >= self.read && end <= capacity => Ok([self.read..end, 0..self.write]),
            end => Err(BoundsViolation::new(
                "wrap_mark",
                self.read,
                end.unwrap_or(usize::MAX),
                capacity,
            )),
        }
    }

    /// 已占用字节数（帧头加负载）。
    pub(crate) fn used(&self) -> Result<usize, BoundsViolation> {
        self.segments()
            .map(|segments| segments.iter().map(ExactSizeIterator::len).sum())
    }

    /// 计算负载长度为 `length` 的报文的落点；头部与起点都放不下时返回 `None`。
    ///
    /// 依次尝试：整帧写在写游标处；帧头写在写游标处、负载回绕到 0；
    /// 头部连帧头都放不下时整帧回绕到 0。
    pub(crate) fn place(&self, length: usize) -> Option<Placement> {
        let needed = HEADER_LEN.checked_add(length)?;
        let head = self.space_at_head();
        let start = self.space_at_start();
        if head > needed {
            return Some(Placement {
                header_at: self.write,
                body_at: self.write + HEADER_LEN,
                wrap: None,
            });
        }
        if head >= HEADER_LEN && start > length {
            return Some(Placement {
                header_at: self.write,
                body_at: 0,
                wrap: Some(WrapMark::SplitFrame {
                    header_end: self.write + HEADER_LEN,
                }),
            });
        }
        if head < HEADER_LEN && start > needed {
            return Some(Placement {
                header_at: 0,
                body_at: HEADER_LEN,
                wrap: Some(WrapMark::WholeFrame { gap_at: self.write }),
            });
        }
        None
    }

    /// 写入帧头、调用填充回调并提交写游标。
    ///
    /// # 契约说明（What）
    /// - `fill` 拿到的切片长度恰好等于 `header.length()`，其生命周期止于本次调用；
    /// - 帧头写入失败时不会调用 `fill`，也不会移动任何游标；
    /// - 若 `fill` 发生 panic，游标同样保持不变，已写入的帧头会被后续写入覆盖。
    pub(crate) fn commit<F>(
        &mut self,
        placement: Placement,
        header: PacketHeader,
        fill: F,
    ) -> Result<(), BoundsViolation>
    where
        F: FnOnce(&mut [u8]),
    {
        let capacity = self.capacity();
        header.encode(&mut self.bytes, placement.header_at)?;
        let body = placement.body_at..placement.body_at + header.length();
        let Some(dst) = self.bytes.get_mut(body.clone()) else {
            return Err(BoundsViolation::new(
                "commit",
                body.start,
                header.length(),
                capacity,
            ));
        };
        fill(dst);
        if placement.wrap.is_some() {
            self.wrap_mark = placement.wrap;
        }
        self.write = body.end;
        Ok(())
    }

    /// 解码队首报文并计算其负载区间与下一个读游标。
    ///
    /// - 读游标落在 [`WrapMark::WholeFrame`] 的空隙起点时，帧头位于竞技场起点；
    /// - 帧头结束位置等于 [`WrapMark::SplitFrame`] 记录的位置时，负载位于竞技场起点；
    /// - 未记录回绕却跨越末尾的报文视为越界。
    pub(crate) fn locate_next(&self) -> Result<PacketSlot, BoundsViolation> {
        let capacity = self.capacity();
        let jumps = self.wrap_mark == Some(WrapMark::WholeFrame { gap_at: self.read });
        let header_at = if jumps { 0 } else { self.read };
        let header = PacketHeader::decode(&self.bytes, header_at)?;
        let header_end = header_at + HEADER_LEN;
        let splits = self.wrap_mark == Some(WrapMark::SplitFrame { header_end });
        let consumes_wrap = jumps || splits;
        let body_start = if splits { 0 } else { header_end };
        let payload = header.payload_range(body_start, capacity)?;
        let next_read = body_start + header.length();
        if next_read >= capacity {
            return Err(BoundsViolation::new(
                "next_read",
                body_start,
                header.length(),
                capacity,
            ));
        }
        Ok(PacketSlot {
            header,
            payload,
            next_read,
            consumes_wrap,
        })
    }

    pub(crate) fn payload(&self, range: Range<usize>) -> &[u8] {
        &self.bytes[range]
    }

    pub(crate) fn advance_read(&mut self, slot: &PacketSlot) {
        self.read = slot.next_read;
        if slot.consumes_wrap {
            self.wrap_mark = None;
        }
    }

    /// 回到空状态：游标归零并清除回绕标记，不改变容量。
    pub(crate) fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
        self.wrap_mark = None;
    }

    /// 以新的容量重建竞技场，按“尾段在前、头段在后”的顺序线性化有效数据。
    ///
    /// 任何区段不一致（缺失回绕标记、越界、容量不足）都会返回错误，且不做部分拷贝。
    pub(crate) fn linearize(&self, new_capacity: usize) -> Result<Arena, BoundsViolation> {
        let [tail, head] = self.segments()?;
        let total = tail.len() + head.len();
        if total >= new_capacity {
            return Err(BoundsViolation::new("linearize", 0, total, new_capacity));
        }
        let mut next = Arena::with_capacity(new_capacity);
        next.bytes[..tail.len()].copy_from_slice(&self.bytes[tail.clone()]);
        next.bytes[tail.len()..total].copy_from_slice(&self.bytes[head]);
        next.write = total;
        Ok(next)
    }

    #[cfg(test)]
    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(arena: &mut Arena, payload: &[u8]) -> Placement {
        let header = PacketHeader::new(payload.len(), 0).expect("合法参数");
        let placement = arena.place(payload.len()).expect("应有空间");
        arena
            .commit(placement, header, |dst| dst.copy_from_slice(payload))
            .expect("提交写入");
        placement
    }

    fn pop(arena: &mut Arena) -> Vec<u8> {
        let slot = arena.locate_next().expect("队首报文合法");
        let out = arena.payload(slot.payload.clone()).to_vec();
        arena.advance_read(&slot);
        out
    }

    #[test]
    fn space_math_follows_cursor_order() {
        let mut arena = Arena::with_capacity(64);
        assert_eq!(arena.space_at_head(), 64);
        assert_eq!(arena.space_at_start(), 0);

        push(&mut arena, &[1; 16]);
        push(&mut arena, &[2; 16]);
        assert_eq!(arena.write_cursor(), 48);
        assert_eq!(arena.space_at_head(), 16);

        pop(&mut arena);
        assert_eq!(arena.read_cursor(), 24);
        assert_eq!(arena.space_at_start(), 24);
        assert_eq!(arena.used(), Ok(24));
    }

    #[test]
    fn wrapped_payload_starts_at_zero_and_reads_back_in_order() {
        let mut arena = Arena::with_capacity(64);
        push(&mut arena, &[1; 20]);
        push(&mut arena, &[2; 10]);
        assert_eq!(pop(&mut arena), vec![1; 20]);

        let placement = push(&mut arena, &[3; 12]);
        assert_eq!(placement.body_at, 0);
        assert_eq!(arena.wrap_mark(), Some(WrapMark::SplitFrame { header_end: 54 }));
        assert_eq!(arena.write_cursor(), 12);
        assert_eq!(arena.space_at_start(), 0);

        assert_eq!(pop(&mut arena), vec![2; 10]);
        assert_eq!(pop(&mut arena), vec![3; 12]);
        assert_eq!(arena.wrap_mark(), None);
        assert_eq!(arena.read_cursor(), 12);
    }

    #[test]
    fn linearize_copies_tail_before_head() {
        let mut arena = Arena::with_capacity(64);
        push(&mut arena, &[1; 20]);
        push(&mut arena, &[2; 10]);
        pop(&mut arena);
        push(&mut arena, &[3; 12]);

        let mut grown = arena.linearize(128).expect("线性化成功");
        assert_eq!(grown.capacity(), 128);
        assert_eq!(grown.read_cursor(), 0);
        assert_eq!(grown.used(), Ok(38));
        assert_eq!(pop(&mut grown), vec![2; 10]);
        assert_eq!(pop(&mut grown), vec![3; 12]);
    }

    #[test]
    fn linearize_refuses_missing_wrap_mark() {
        let mut arena = Arena::with_capacity(64);
        push(&mut arena, &[1; 20]);
        push(&mut arena, &[2; 10]);
        pop(&mut arena);
        push(&mut arena, &[3; 12]);
        arena.wrap_mark = None;
        assert_eq!(arena.linearize(128).unwrap_err().site, "wrap_mark");
    }

    #[test]
    fn narrow_tail_gap_moves_whole_frame_to_start() {
        let mut arena = Arena::with_capacity(64);
        push(&mut arena, &[1; 20]);
        push(&mut arena, &[2; 24]);
        assert_eq!(arena.space_at_head(), 4);
        assert_eq!(pop(&mut arena), vec![1; 20]);

        let placement = push(&mut arena, &[3; 10]);
        assert_eq!((placement.header_at, placement.body_at), (0, HEADER_LEN));
        assert_eq!(arena.wrap_mark(), Some(WrapMark::WholeFrame { gap_at: 60 }));
        assert_eq!(arena.write_cursor(), 18);
        assert_eq!(arena.used(), Ok(32 + 18));

        assert_eq!(pop(&mut arena), vec![2; 24]);
        assert_eq!(arena.read_cursor(), 60);
        assert_eq!(pop(&mut arena), vec![3; 10]);
        assert_eq!(arena.wrap_mark(), None);
        assert_eq!(arena.read_cursor(), 18);
    }

    #[test]
    fn linearize_drops_narrow_tail_gap() {
        let mut arena = Arena::with_capacity(64);
        push(&mut arena, &[1; 20]);
        push(&mut arena, &[2; 24]);
        pop(&mut arena);
        push(&mut arena, &[3; 10]);

        let mut grown = arena.linearize(128).expect("线性化成功");
        assert_eq!(grown.used(), Ok(50));
        assert_eq!(pop(&mut grown), vec![2; 24]);
        assert_eq!(pop(&mut grown), vec![3; 10]);
    }

    #[test]
    fn straddling_packet_without_wrap_is_rejected() {
        let mut arena = Arena::with_capacity(32);
        PacketHeader::new(40, 0)
            .expect("合法参数")
            .encode(arena.bytes_mut(), 0)
            .expect("帧头写入");
        assert!(arena.locate_next().is_err());
    }
}
