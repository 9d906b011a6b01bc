use nalgebra::{convert, zero, RealField};

/// Vertex of the parabola through three samples `(x[i], y[i])`.
///
/// Returns `None` unless the parabola opens upwards and the vertex is
/// finite. The samples need not be evenly spaced but must be distinct.
pub fn poly2_vertex<R: RealField>(x: [R; 3], y: [R; 3]) -> Option<R> {
    let [x0, x1, x2] = x;
    let [y0, y1, y2] = y;

    let h0 = x1.clone() - x0.clone();
    let h1 = x2.clone() - x1.clone();
    let curvature = ((y2.clone() - y1.clone()) / h1.clone() - (y1.clone() - y0.clone()) / h0.clone())
        / (x2 - x0);
    if !curvature.is_finite() || curvature <= zero() {
        return None;
    }

    let half: R = convert(0.5);
    let numerator = h0.clone() * h0.clone() * (y1.clone() - y2.clone())
        - h1.clone() * h1.clone() * (y1.clone() - y0.clone());
    let denominator = h0 * (y1.clone() - y2) + h1 * (y1 - y0);
    let vertex = x1 - half * numerator / denominator;
    if vertex.is_finite() {
        Some(vertex)
    } else {
        None
    }
}

/// Refine the minimum of a sampled function.
///
/// `costs[i]` is the function evaluated at `values[i]` and `index` is the
/// sample with the smallest cost. A parabola is fitted through that sample
/// and its two neighbours and its vertex is returned. Returns `None` at
/// either end of the samples, when a neighbour is NaN, or when the three
/// samples do not curve upwards.
pub fn find_subvalue_poly2<R: RealField>(values: &[R], costs: &[R], index: usize) -> Option<R> {
    if index == 0 || index + 1 >= values.len() || index + 1 >= costs.len() {
        return None;
    }
    poly2_vertex(
        [
            values[index - 1].clone(),
            values[index].clone(),
            values[index + 1].clone(),
        ],
        [
            costs[index - 1].clone(),
            costs[index].clone(),
            costs[index + 1].clone(),
        ],
    )
}
