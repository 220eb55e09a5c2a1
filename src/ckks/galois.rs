//! Galois automorphisms for slot rotation
//!
//! τ_g: X ↦ X^g for odd g. With slots ordered along powers of 5, the element
//! g = 5^k mod 2N rotates the slot vector left by k positions.

/// Galois element for a left rotation by `steps` slots
pub fn galois_element(steps: usize, n: usize) -> usize {
    let two_n = 2 * n;
    let mut g = 1usize;
    for _ in 0..(steps % (n / 2)) {
        g = (g * 5) % two_n;
    }
    g
}

/// Elements for rotations by 1, 2, 4, …, N/4; any step is a product of these
pub fn rotation_elements(n: usize) -> Vec<usize> {
    let slots = n / 2;
    let two_n = 2 * n;
    let mut elements = Vec::new();
    let mut g = 5usize;
    let mut step = 1;
    while step < slots {
        elements.push(g);
        g = (g * g) % two_n;
        step <<= 1;
    }
    elements
}

/// Decompose a rotation into the power-of-two Galois elements it needs
pub fn rotation_plan(steps: usize, n: usize) -> Vec<usize> {
    let steps = steps % (n / 2);
    rotation_elements(n)
        .into_iter()
        .enumerate()
        .filter(|(bit, _)| steps & (1 << bit) != 0)
        .map(|(_, g)| g)
        .collect()
}

/// Check if g is a valid Galois element (odd and below 2N)
pub fn is_valid_galois_element(g: usize, n: usize) -> bool {
    g % 2 == 1 && g < 2 * n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elements_are_powers_of_five() {
        let n = 4096;
        let elems = rotation_elements(n);
        assert_eq!(elems.len(), 11);
        for (i, &g) in elems.iter().enumerate() {
            assert_eq!(g, galois_element(1 << i, n));
            assert!(is_valid_galois_element(g, n));
        }
    }

    #[test]
    fn test_rotation_plan_composes() {
        let n = 1024;
        let two_n = 2 * n;
        for steps in [1usize, 3, 100, 511] {
            let composed = rotation_plan(steps, n)
                .into_iter()
                .fold(1usize, |acc, g| (acc * g) % two_n);
            assert_eq!(composed, galois_element(steps, n));
        }
        assert!(rotation_plan(0, n).is_empty());
        assert!(rotation_plan(512, n).is_empty());
    }

    #[test]
    fn test_five_has_order_half_n() {
        let n = 256;
        assert_eq!(galois_element(n / 2, n), 1);
        assert_ne!(galois_element(n / 4, n), 1);
    }
}
