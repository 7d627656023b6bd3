use crate::shared::region::Region;

/// Relative tolerance used when clustering raw detector hits.
pub const GROUP_EPS: f64 = 0.2;

/// A cluster of raw detector hits collapsed into one averaged rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GroupedRegion {
    pub region: Region,
    pub neighbors: u32,
}

/// Clusters overlapping candidate windows and keeps the well-supported ones.
///
/// Two candidates join a cluster when every edge lies within
/// `eps * (min widths + min heights) / 2` of the other's. Each cluster is
/// averaged into one rectangle; clusters with `min_neighbors` members or
/// fewer are dropped, as are small clusters nested inside a stronger one.
/// With `min_neighbors == 0` the raw candidates pass through untouched.
///
/// Output is ordered by the first candidate of each cluster.
pub fn group_rectangles(candidates: &[Region], min_neighbors: u32, eps: f64) -> Vec<GroupedRegion> {
    if min_neighbors == 0 || candidates.is_empty() {
        return candidates
            .iter()
            .map(|&region| GroupedRegion {
                region,
                neighbors: 1,
            })
            .collect();
    }

    let (labels, class_count) = partition(candidates, eps);

    let mut sums = vec![[0i64; 4]; class_count];
    let mut counts = vec![0u32; class_count];
    for (r, &label) in candidates.iter().zip(&labels) {
        let s = &mut sums[label];
        s[0] += r.x as i64;
        s[1] += r.y as i64;
        s[2] += r.width as i64;
        s[3] += r.height as i64;
        counts[label] += 1;
    }

    let averaged: Vec<Region> = sums
        .iter()
        .zip(&counts)
        .map(|(s, &n)| {
            let inv = 1.0 / n as f64;
            Region::new(
                (s[0] as f64 * inv).round() as i32,
                (s[1] as f64 * inv).round() as i32,
                (s[2] as f64 * inv).round() as i32,
                (s[3] as f64 * inv).round() as i32,
            )
        })
        .collect();

    let mut grouped = Vec::new();
    for (i, (&r1, &n1)) in averaged.iter().zip(&counts).enumerate() {
        if n1 <= min_neighbors {
            continue;
        }
        let nested = averaged.iter().zip(&counts).enumerate().any(|(j, (r2, &n2))| {
            j != i && n2 > min_neighbors && is_nested(&r1, n1, r2, n2, eps)
        });
        if !nested {
            grouped.push(GroupedRegion {
                region: r1,
                neighbors: n1,
            });
        }
    }
    grouped
}

fn is_similar(a: &Region, b: &Region, eps: f64) -> bool {
    let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f64 * 0.5;
    ((a.x - b.x).abs() as f64) <= delta
        && ((a.y - b.y).abs() as f64) <= delta
        && ((a.right() - b.right()).abs() as f64) <= delta
        && ((a.bottom() - b.bottom()).abs() as f64) <= delta
}

/// `inner` lies within `outer` (allowing an eps margin) and `outer` is the
/// better-supported cluster.
fn is_nested(inner: &Region, n_inner: u32, outer: &Region, n_outer: u32, eps: f64) -> bool {
    let dx = (outer.width as f64 * eps).round() as i32;
    let dy = (outer.height as f64 * eps).round() as i32;
    inner.x >= outer.x - dx
        && inner.y >= outer.y - dy
        && inner.right() <= outer.right() + dx
        && inner.bottom() <= outer.bottom() + dy
        && (n_outer > n_inner.max(3) || n_inner < 3)
}

/// Union-find over the similarity relation. Labels are numbered in order of
/// each class's first member.
fn partition(rects: &[Region], eps: f64) -> (Vec<usize>, usize) {
    let mut parent: Vec<usize> = (0..rects.len()).collect();

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for i in 0..rects.len() {
        for j in 0..i {
            if is_similar(&rects[i], &rects[j], eps) {
                let ri = find(&mut parent, i);
                let rj = find(&mut parent, j);
                if ri != rj {
                    parent[ri.max(rj)] = ri.min(rj);
                }
            }
        }
    }

    let mut class_of_root = vec![usize::MAX; rects.len()];
    let mut labels = Vec::with_capacity(rects.len());
    let mut class_count = 0;
    for i in 0..rects.len() {
        let root = find(&mut parent, i);
        if class_of_root[root] == usize::MAX {
            class_of_root[root] = class_count;
            class_count += 1;
        }
        labels.push(class_of_root[root]);
    }
    (labels, class_count)
}
