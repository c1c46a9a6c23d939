//! Property tests over random shapes and values.

use ad_core::prelude::*;
use ad_core::check_gradient;
use proptest::prelude::*;

fn shape_strategy() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1usize..5, 1..4)
}

fn tensor_strategy() -> impl Strategy<Value = (Vec<usize>, Vec<f64>)> {
    shape_strategy().prop_flat_map(|shape| {
        let numel: usize = shape.iter().product();
        (Just(shape), prop::collection::vec(-10.0f64..10.0, numel))
    })
}

fn pair_strategy() -> impl Strategy<Value = (Vec<usize>, Vec<f64>, Vec<f64>)> {
    shape_strategy().prop_flat_map(|shape| {
        let numel: usize = shape.iter().product();
        (
            Just(shape),
            prop::collection::vec(-10.0f64..10.0, numel),
            prop::collection::vec(-10.0f64..10.0, numel),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn numel_is_product_of_shape(dims in shape_strategy(), value in -5.0f64..5.0) {
        let t = Tensor::full(dims.clone(), value).unwrap();
        let expected: usize = dims.iter().product();
        prop_assert!(expected > 0);
        prop_assert_eq!(t.numel(), expected);
        prop_assert_eq!(t.relu().numel(), expected);
        prop_assert_eq!(t.get_data().unwrap().len(), expected);
    }

    #[test]
    fn add_is_commutative((dims, a, b) in pair_strategy()) {
        let a = Tensor::new(dims.clone(), a).unwrap();
        let b = Tensor::new(dims, b).unwrap();
        prop_assert_eq!(
            a.add(&b).unwrap().get_data().unwrap(),
            b.add(&a).unwrap().get_data().unwrap()
        );
    }

    #[test]
    fn scalar_broadcast_matches_scalar_op((dims, data) in tensor_strategy(), c in -10.0f64..10.0) {
        let a = Tensor::new(dims, data).unwrap();
        let scalar = Tensor::new([1], vec![c]).unwrap();
        prop_assert_eq!(
            a.add(&scalar).unwrap().get_data().unwrap(),
            a.add_scalar(c).get_data().unwrap()
        );
        prop_assert_eq!(
            scalar.subtract(&a).unwrap().get_data().unwrap(),
            a.scalar_subtract(c).get_data().unwrap()
        );
    }

    #[test]
    fn reshape_preserves_data((dims, data) in tensor_strategy()) {
        let a = Tensor::new(dims, data.clone()).unwrap();
        let flat = a.reshape([data.len()]).unwrap();
        prop_assert_eq!(flat.get_data().unwrap(), data);
    }

    #[test]
    fn double_transpose_is_identity(rows in 1usize..6, cols in 1usize..6, seed in any::<u64>()) {
        let data: Vec<f64> = (0..rows * cols).map(|i| (i as u64 ^ seed) as f64 % 97.0).collect();
        let a = Tensor::new([rows, cols], data.clone()).unwrap();
        let t = a.transpose().unwrap();
        prop_assert_eq!(t.shape(), &Shape::from([cols, rows]));
        prop_assert_eq!(t.transpose().unwrap().get_data().unwrap(), data);
    }

    #[test]
    fn product_gradient_is_other_operand((dims, a, b) in pair_strategy()) {
        let x = Tensor::var(dims.clone(), a).unwrap();
        let y = Tensor::new(dims, b.clone()).unwrap();
        x.elementwise_mult(&y).unwrap().reduce_sum().backward().unwrap();
        prop_assert_eq!(x.gradient().unwrap().get_data().unwrap(), b);
    }

    #[test]
    fn polynomial_gradient_matches_finite_differences((dims, data) in tensor_strategy()) {
        let x = Tensor::new(dims, data).unwrap();
        let f = |t: &Tensor| -> ad_core::Result<Tensor> {
            t.pow(3.0)
                .elementwise_mult_scalar(0.1)
                .subtract(&t.elementwise_mult(t)?.elementwise_mult_scalar(0.5))
        };
        let err = check_gradient(f, &x, 1e-6).unwrap();
        prop_assert!(err < 1e-4, "max error {}", err);
    }
}
