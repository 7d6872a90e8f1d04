use kube::CustomResourceExt;
use nsnet_operator::crd::NamespaceNetwork;

fn main() {
    print!("{}", serde_yaml::to_string(&NamespaceNetwork::crd()).unwrap());
}
