use {
    crate::{Error, Result},
    std::cmp::Ordering,
};

/// One comparison key per rank, `sz` bytes each, `stride` bytes apart.
#[derive(Clone, Copy, Debug)]
pub struct Keys<'a>
{
    bytes: &'a [u8],
    count: usize,
    sz: usize,
    stride: usize,
}

impl<'a> Keys<'a>
{
    /// View `count` keys in `bytes`.
    pub fn new(bytes: &'a [u8], count: usize, sz: usize, stride: usize) -> Result<Self>
    {
        let usage = |reason: String| Error::usage("nodemap construction", reason);
        if count == 0 || sz == 0 || stride < sz {
            return Err(usage(format!(
                "with {} keys of {} bytes spaced {} bytes apart", count, sz, stride,
            )));
        }
        let needed = (count - 1).checked_mul(stride).and_then(|n| n.checked_add(sz));
        match needed {
            Some(needed) if needed <= bytes.len() => Ok(Self{bytes, count, sz, stride}),
            _ => Err(usage(format!(
                "with {} bytes for {} keys of {} bytes spaced {} bytes apart",
                bytes.len(), count, sz, stride,
            ))),
        }
    }

    /// Number of keys.
    pub fn len(&self) -> usize
    {
        self.count
    }

    /// Always false.
    pub fn is_empty(&self) -> bool
    {
        self.count == 0
    }

    /// The key of rank `i`.
    pub fn key(&self, i: usize) -> &'a [u8]
    {
        let start = i * self.stride;
        &self.bytes[start .. start + self.sz]
    }
}

/// Map every rank to the lowest rank with an equal key.
pub fn build(keys: &Keys, exact: bool) -> Vec<u32>
{
    if exact {
        build_exact(keys)
    } else {
        build_linear(keys)
    }
}

/// Nodemap by sorting, correct for every layout.
pub fn build_exact(keys: &Keys) -> Vec<u32>
{
    let mut order: Vec<usize> = (0 .. keys.len()).collect();
    order.sort_by(|&a, &b| match keys.key(a).cmp(keys.key(b)) {
        Ordering::Equal => a.cmp(&b),
        other => other,
    });

    let mut nodemap = vec![0; keys.len()];
    let mut prev = order[0];
    nodemap[prev] = prev as u32;
    for &node in &order[1 ..] {
        if keys.key(node) != keys.key(prev) {
            nodemap[node] = node as u32;
        } else {
            nodemap[node] = nodemap[prev];
        }
        prev = node;
    }
    nodemap
}

/// Nodemap in a single pass.
///
/// Each key is compared with a few candidates only:
/// the key before, the first key, and the starts of the current and
/// previous runs. This finds all sharing for block, block-cyclic,
/// and cyclic layouts, and never groups unequal keys,
/// but may miss sharing in other layouts.
pub fn build_linear(keys: &Keys) -> Vec<u32>
{
    let mut nodemap = vec![0; keys.len()];
    let mut prev = 0;
    let mut base = 0;

    for i in 1 .. keys.len() {
        let key = keys.key(i);

        if key == keys.key(prev) {
            nodemap[i] = nodemap[prev];
            prev += 1;
            continue;
        }

        if key == keys.key(0) {
            prev = 0;
        } else if key == keys.key(base) {
            prev = base;
        } else if key == keys.key(prev + 1) {
            prev += 1;
        } else {
            prev = i;
            base = i;
        }
        nodemap[i] = if prev == i { i as u32 } else { nodemap[prev] };
    }

    nodemap
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        proptest::{collection::vec, proptest},
    };

    fn lowest_equal(keys: &[u8]) -> Vec<u32>
    {
        keys.iter()
            .map(|k| keys.iter().position(|j| j == k).unwrap() as u32)
            .collect()
    }

    #[test]
    fn two_hosts()
    {
        let bytes = b"AABB";
        let keys = Keys::new(bytes, 4, 1, 1).unwrap();
        assert_eq!(build_exact(&keys), [0, 0, 2, 2]);
        assert_eq!(build_linear(&keys), [0, 0, 2, 2]);
    }

    #[test]
    fn strided_keys()
    {
        let bytes = b"x1-y1-x1-y2-";
        let keys = Keys::new(bytes, 4, 2, 3).unwrap();
        assert_eq!(build_exact(&keys), [0, 1, 0, 3]);
    }

    #[test]
    fn bad_key_vectors()
    {
        assert!(Keys::new(b"AAAA", 4, 2, 2).is_err());
        assert!(Keys::new(b"AAAA", 2, 2, 1).is_err());
        assert!(Keys::new(b"AAAA", 0, 1, 1).is_err());
        assert!(Keys::new(b"AAAA", 2, 1, 3).is_ok());
    }

    #[test]
    fn scrambled_layout_is_safe()
    {
        let bytes = b"ABCBA";
        let keys = Keys::new(bytes, 5, 1, 1).unwrap();
        let linear = build_linear(&keys);
        for (i, &n) in linear.iter().enumerate() {
            assert_eq!(bytes[i], bytes[n as usize]);
        }
        assert_eq!(build_exact(&keys), [0, 1, 2, 1, 0]);
    }

    proptest!
    {
        #[test]
        fn exact_is_lowest_equal(bytes in vec(0u8 .. 4, 1 .. 64))
        {
            let keys = Keys::new(&bytes, bytes.len(), 1, 1).unwrap();
            assert_eq!(build_exact(&keys), lowest_equal(&bytes));
        }

        #[test]
        fn fixed_point(bytes in vec(0u8 .. 6, 1 .. 64), exact: bool)
        {
            let keys = Keys::new(&bytes, bytes.len(), 1, 1).unwrap();
            let nodemap = build(&keys, exact);
            for (i, &n) in nodemap.iter().enumerate() {
                assert_eq!(nodemap[n as usize], n);
                assert!(n as usize <= i);
                assert_eq!(bytes[i], bytes[n as usize]);
            }
        }

        #[test]
        fn linear_on_block_cyclic(n in 1usize .. 80, hosts in 1usize .. 9, block in 1usize .. 9)
        {
            let bytes: Vec<u8> = (0 .. n).map(|i| ((i / block) % hosts) as u8).collect();
            let keys = Keys::new(&bytes, n, 1, 1).unwrap();
            assert_eq!(build_linear(&keys), lowest_equal(&bytes));
        }

        #[test]
        fn linear_on_uneven_blocks(counts in vec(1usize .. 9, 1 .. 9))
        {
            let bytes: Vec<u8> = counts.iter().enumerate()
                .flat_map(|(host, &count)| std::iter::repeat(host as u8).take(count))
                .collect();
            let keys = Keys::new(&bytes, bytes.len(), 1, 1).unwrap();
            assert_eq!(build_linear(&keys), lowest_equal(&bytes));
        }
    }
}
