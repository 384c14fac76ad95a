use crate::record::Record;
use crate::wide;
use serde::Serialize;
use smallvec::SmallVec;
use std::fmt;

/// Three edges A, B, C with `A^2 + B^2 + C^2 = G^2` whose face diagonals
/// `D = sqrt(A^2 + B^2)`, `E = sqrt(A^2 + C^2)` and `F = sqrt(B^2 + C^2)` are
/// all integers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Finding {
    pub g: u64,
    pub a: u64,
    pub b: u64,
    pub c: u64,
    pub d: u64,
    pub e: u64,
    pub f: u64,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "A={} B={} C={} D={} E={} F={} G={}",
            self.a, self.b, self.c, self.d, self.e, self.f, self.g
        )
    }
}

pub type Findings = SmallVec<[Finding; 2]>;

/// Scans one group of pair records sharing G, ordered by short edge.
///
/// Picks record i as (A, F) and record j > i as (B, E), then binary searches
/// the records after j for one with a leg whose square is `A^2 + B^2`. That leg
/// is D and the other one is C. Every match is reported.
pub fn detect_pair_group(members: &[Record]) -> Findings {
    let mut findings = Findings::new();
    let n = members.len();
    if n < 3 {
        return findings;
    }

    let g = members[0].g();

    for i in 0..n - 2 {
        let a = members[i].short_edge();
        // A is the smallest of three edges whose squares sum to G^2: 3A^2 < G^2.
        if wide::scaled_square_reaches(3, a, g) {
            break;
        }
        let f = members[i].long_edge();

        for j in i + 1..n - 1 {
            let b = members[j].short_edge();
            // At most one edge of a perfect cuboid is odd.
            if a & 1 == 1 && b & 1 == 1 {
                continue;
            }
            // B is the smaller edge of the face with diagonal F: 2B^2 < F^2.
            if wide::scaled_square_reaches(2, b, f) {
                break;
            }

            let Some(ab2) = wide::sum_of_squares(a, b) else {
                continue;
            };
            if let Some((c, d)) = search_face_diagonal(&members[j + 1..], ab2) {
                findings.push(Finding {
                    g,
                    a,
                    b,
                    c,
                    d,
                    e: members[j].long_edge(),
                    f,
                });
            }
        }
    }
    findings
}

/// Returns `(other leg, matching leg)` of a record with a leg squared equal to
/// `target`.
fn search_face_diagonal(candidates: &[Record], target: u128) -> Option<(u64, u64)> {
    let (mut low, mut high) = (0, candidates.len());
    while low < high {
        let mid = low + (high - low) / 2;
        let record = &candidates[mid];
        let short2 = wide::square(record.short_edge());
        let long2 = wide::square(record.long_edge());

        if target == short2 {
            return Some((record.long_edge(), record.short_edge()));
        }
        if target == long2 {
            return Some((record.short_edge(), record.long_edge()));
        }
        if target < short2 || long2 < target {
            high = mid;
        } else {
            low = mid + 1;
        }
    }
    None
}

/// A three-edge record is a finding when all three face diagonals are integers.
pub fn detect_quadruple(record: &Record) -> Option<Finding> {
    let (a, b, c) = (record.a(), record.b(), record.c());
    let d = wide::exact_sqrt(wide::sum_of_squares(a, b)?)?;
    let e = wide::exact_sqrt(wide::sum_of_squares(a, c)?)?;
    let f = wide::exact_sqrt(wide::sum_of_squares(b, c)?)?;
    Some(Finding {
        g: record.g(),
        a,
        b,
        c,
        d: d as u64,
        e: e as u64,
        f: f as u64,
    })
}

pub fn detect_quadruple_group(members: &[Record]) -> Findings {
    members.iter().filter_map(detect_quadruple).collect()
}
