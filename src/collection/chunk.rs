/// 按尺寸环（ring）切分序列：当前组长度等于 ring 当前目标时闭合，ring 下标前进并回绕。
/// 输入在组满之前耗尽时，末尾的不完整组原样保留。
pub fn chunk_items<T: Clone>(items: &[T], ring: &[usize], start: usize) -> Vec<Vec<T>> {
    chunk_from(items.iter().cloned(), ring, start).0
}

/// 同 `chunk_items`，额外返回“最后一个完整组之后”的 ring 下标，供增量追加续接。
pub(crate) fn chunk_from<T>(
    items: impl IntoIterator<Item = T>,
    ring: &[usize],
    start: usize,
) -> (Vec<Vec<T>>, usize) {
    if ring.is_empty() {
        return (Vec::new(), 0);
    }
    let mut idx = start % ring.len();
    let mut groups: Vec<Vec<T>> = Vec::new();
    let mut open = false;

    for item in items {
        if !open {
            groups.push(Vec::with_capacity(ring[idx]));
            open = true;
        }
        let Some(current) = groups.last_mut() else {
            break;
        };
        current.push(item);
        if current.len() >= ring[idx] {
            open = false;
            idx += 1;
            if idx == ring.len() {
                idx = 0;
            }
        }
    }
    (groups, idx)
}
