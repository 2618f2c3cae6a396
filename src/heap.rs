use crate::error::{SchemeError, SchemeResult};
use crate::primitives::PrimitiveFn;
use crate::value::{FrameId, PairId, ProcId, StrId, SymbolId, Value};

/// A pair cell: two mutable value slots.
pub struct PairCell {
    pub car: Value,
    pub cdr: Value,
}

/// An environment frame: ordered bindings plus the enclosing frame.
/// Frames live on the heap so that closures keep them reachable.
pub struct FrameCell {
    pub bindings: Vec<(SymbolId, Value)>,
    pub parent: Option<FrameId>,
}

/// A native operation installed into the top-level environment.
pub struct Primitive {
    pub name: SymbolId,
    pub func: PrimitiveFn,
}

/// A user-defined procedure: formals, body, and the captured frame.
pub struct Lambda {
    pub name: Option<SymbolId>,
    pub formals: Vec<SymbolId>,
    pub rest_formal: Option<SymbolId>,
    pub body: Vec<Value>,
    pub env: FrameId,
}

pub enum ProcedureCell {
    Primitive(Primitive),
    Compound(Lambda),
}

enum Occupant {
    Free,
    Pair(PairCell),
    Procedure(ProcedureCell),
    Frame(FrameCell),
    Str(Box<str>),
}

struct Slot {
    occupant: Occupant,
    mark: bool,
}

/// The garbage-collected heap: a growable arena of slots addressed by
/// stable index handles. Objects never move; a slot is reused only after
/// a sweep has freed it. Allocation never triggers a collection.
pub struct Heap {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    capacity: usize,
}

impl Heap {
    pub fn new(capacity: usize) -> Self {
        Heap {
            slots: Vec::with_capacity(1024),
            free_list: Vec::new(),
            capacity,
        }
    }

    fn alloc_slot(&mut self, occupant: Occupant) -> SchemeResult<u32> {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.occupant = occupant;
            slot.mark = false;
            return Ok(index);
        }

        if self.slots.len() >= self.capacity {
            return Err(SchemeError::OutOfMemory);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            occupant,
            mark: false,
        });
        Ok(index)
    }

    /// Allocate a new pair cell.
    pub fn alloc_pair(&mut self, car: Value, cdr: Value) -> SchemeResult<PairId> {
        Ok(PairId(self.alloc_slot(Occupant::Pair(PairCell { car, cdr }))?))
    }

    /// Allocate a procedure cell (primitive or compound).
    pub fn alloc_procedure(&mut self, cell: ProcedureCell) -> SchemeResult<ProcId> {
        Ok(ProcId(self.alloc_slot(Occupant::Procedure(cell))?))
    }

    /// Allocate an empty environment frame.
    pub fn alloc_frame(&mut self, parent: Option<FrameId>) -> SchemeResult<FrameId> {
        Ok(FrameId(self.alloc_slot(Occupant::Frame(FrameCell {
            bindings: Vec::new(),
            parent,
        }))?))
    }

    /// Allocate an immutable string cell.
    pub fn alloc_str(&mut self, text: &str) -> SchemeResult<StrId> {
        Ok(StrId(self.alloc_slot(Occupant::Str(text.into()))?))
    }

    fn pair(&self, id: PairId) -> &PairCell {
        match &self.slots[id.0 as usize].occupant {
            Occupant::Pair(cell) => cell,
            _ => panic!("{:?} does not refer to a live pair cell", id),
        }
    }

    fn pair_mut(&mut self, id: PairId) -> &mut PairCell {
        match &mut self.slots[id.0 as usize].occupant {
            Occupant::Pair(cell) => cell,
            _ => panic!("{:?} does not refer to a live pair cell", id),
        }
    }

    /// Get the car of a pair.
    #[inline]
    pub fn car(&self, id: PairId) -> Value {
        self.pair(id).car
    }

    /// Get the cdr of a pair.
    #[inline]
    pub fn cdr(&self, id: PairId) -> Value {
        self.pair(id).cdr
    }

    /// Set the car of a pair (set-car! primitive).
    #[inline]
    pub fn set_car(&mut self, id: PairId, val: Value) {
        self.pair_mut(id).car = val;
    }

    /// Set the cdr of a pair (set-cdr! primitive).
    #[inline]
    pub fn set_cdr(&mut self, id: PairId, val: Value) {
        self.pair_mut(id).cdr = val;
    }

    /// Get the car of a value if it's a pair, or a type error.
    pub fn car_val(&self, val: Value) -> SchemeResult<Value> {
        match val {
            Value::Pair(id) => Ok(self.car(id)),
            _ => Err(SchemeError::TypeError {
                expected: "pair",
                got: val.type_name(),
            }),
        }
    }

    /// Get the cdr of a value if it's a pair, or a type error.
    pub fn cdr_val(&self, val: Value) -> SchemeResult<Value> {
        match val {
            Value::Pair(id) => Ok(self.cdr(id)),
            _ => Err(SchemeError::TypeError {
                expected: "pair",
                got: val.type_name(),
            }),
        }
    }

    pub fn procedure(&self, id: ProcId) -> &ProcedureCell {
        match &self.slots[id.0 as usize].occupant {
            Occupant::Procedure(cell) => cell,
            _ => panic!("{:?} does not refer to a live procedure cell", id),
        }
    }

    pub fn procedure_mut(&mut self, id: ProcId) -> &mut ProcedureCell {
        match &mut self.slots[id.0 as usize].occupant {
            Occupant::Procedure(cell) => cell,
            _ => panic!("{:?} does not refer to a live procedure cell", id),
        }
    }

    pub fn frame(&self, id: FrameId) -> &FrameCell {
        match &self.slots[id.0 as usize].occupant {
            Occupant::Frame(cell) => cell,
            _ => panic!("{:?} does not refer to a live frame cell", id),
        }
    }

    pub fn frame_mut(&mut self, id: FrameId) -> &mut FrameCell {
        match &mut self.slots[id.0 as usize].occupant {
            Occupant::Frame(cell) => cell,
            _ => panic!("{:?} does not refer to a live frame cell", id),
        }
    }

    pub fn str_text(&self, id: StrId) -> &str {
        match &self.slots[id.0 as usize].occupant {
            Occupant::Str(text) => text,
            _ => panic!("{:?} does not refer to a live string cell", id),
        }
    }

    /// Build a proper list from a slice of values.
    pub fn list(&mut self, values: &[Value]) -> SchemeResult<Value> {
        let mut result = Value::Nil;
        for &val in values.iter().rev() {
            let pair = self.alloc_pair(val, result)?;
            result = Value::Pair(pair);
        }
        Ok(result)
    }

    /// Collect a proper list into a Vec. Returns None if not a proper list.
    pub fn list_to_vec(&self, val: Value) -> Option<Vec<Value>> {
        let mut result = Vec::new();
        let mut current = val;
        loop {
            match current {
                Value::Nil => return Some(result),
                Value::Pair(id) => {
                    result.push(self.car(id));
                    current = self.cdr(id);
                }
                _ => return None,
            }
        }
    }

    /// Returns true if this value is a proper list.
    pub fn is_proper_list(&self, val: Value) -> bool {
        let mut current = val;
        loop {
            match current {
                Value::Nil => return true,
                Value::Pair(id) => current = self.cdr(id),
                _ => return false,
            }
        }
    }

    /// Number of occupied slots.
    pub fn occupied_count(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    /// Total slot capacity (the allocation ceiling).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots on the free list.
    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }

    // === GC methods ===

    /// Clear all mark bits (start of a collection cycle).
    pub fn clear_marks(&mut self) {
        for slot in &mut self.slots {
            slot.mark = false;
        }
    }

    fn mark_slot(&mut self, index: u32, worklist: &mut Vec<u32>) {
        let slot = &mut self.slots[index as usize];
        if !slot.mark {
            slot.mark = true;
            worklist.push(index);
        }
    }

    /// Mark a root value. Heap-backed values are pushed onto the worklist.
    pub fn mark_value(&mut self, val: Value, worklist: &mut Vec<u32>) {
        match val {
            Value::Pair(id) => self.mark_slot(id.0, worklist),
            Value::Procedure(id) => self.mark_slot(id.0, worklist),
            Value::Str(id) => self.mark_slot(id.0, worklist),
            _ => {}
        }
    }

    /// Mark a root frame.
    pub fn mark_frame(&mut self, id: FrameId, worklist: &mut Vec<u32>) {
        self.mark_slot(id.0, worklist);
    }

    /// Trace the transitive closure of every marked slot. Revisiting a
    /// marked slot stops the traversal, so cycles terminate.
    pub fn process_worklist(&mut self, worklist: &mut Vec<u32>) {
        let mut children: Vec<Value> = Vec::new();
        while let Some(index) = worklist.pop() {
            children.clear();
            let mut child_frame: Option<FrameId> = None;
            match &self.slots[index as usize].occupant {
                Occupant::Pair(cell) => {
                    children.push(cell.car);
                    children.push(cell.cdr);
                }
                Occupant::Procedure(ProcedureCell::Compound(lambda)) => {
                    children.extend_from_slice(&lambda.body);
                    child_frame = Some(lambda.env);
                }
                Occupant::Frame(frame) => {
                    children.extend(frame.bindings.iter().map(|&(_, val)| val));
                    child_frame = frame.parent;
                }
                _ => {}
            }
            if let Some(id) = child_frame {
                self.mark_slot(id.0, worklist);
            }
            for &child in &children {
                self.mark_value(child, worklist);
            }
        }
    }

    /// Free every unmarked occupied slot and clear marks.
    /// Returns the number of cells freed.
    pub fn sweep(&mut self) -> usize {
        let mut freed = 0;
        self.free_list.clear();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.mark {
                slot.mark = false;
            } else {
                if !matches!(slot.occupant, Occupant::Free) {
                    slot.occupant = Occupant::Free;
                    freed += 1;
                }
                self.free_list.push(index as u32);
            }
        }
        freed
    }
}

#[cfg(test)]
mod tests {
    use super::Heap;
    use crate::error::SchemeError;
    use crate::value::Value;

    fn collect(heap: &mut Heap, roots: &[Value]) -> usize {
        heap.clear_marks();
        let mut worklist = Vec::new();
        for &root in roots {
            heap.mark_value(root, &mut worklist);
        }
        heap.process_worklist(&mut worklist);
        heap.sweep()
    }

    #[test]
    fn alloc_and_read_back() {
        let mut heap = Heap::new(16);
        let id = heap.alloc_pair(Value::Number(1.0), Value::Number(2.0)).unwrap();
        assert_eq!(heap.car(id), Value::Number(1.0));
        assert_eq!(heap.cdr(id), Value::Number(2.0));
        heap.set_cdr(id, Value::Nil);
        assert_eq!(heap.cdr(id), Value::Nil);
    }

    #[test]
    fn capacity_is_a_hard_ceiling() {
        let mut heap = Heap::new(2);
        heap.alloc_pair(Value::Nil, Value::Nil).unwrap();
        heap.alloc_pair(Value::Nil, Value::Nil).unwrap();
        assert_eq!(
            heap.alloc_pair(Value::Nil, Value::Nil),
            Err(SchemeError::OutOfMemory)
        );
    }

    #[test]
    fn reachable_cells_survive_collection_unchanged() {
        let mut heap = Heap::new(16);
        let inner = heap.alloc_pair(Value::Number(2.0), Value::Nil).unwrap();
        let outer = heap
            .alloc_pair(Value::Number(1.0), Value::Pair(inner))
            .unwrap();
        let freed = collect(&mut heap, &[Value::Pair(outer)]);
        assert_eq!(freed, 0);
        assert_eq!(heap.car(outer), Value::Number(1.0));
        assert_eq!(heap.car(inner), Value::Number(2.0));
    }

    #[test]
    fn unreachable_cells_are_freed_and_slots_reused() {
        let mut heap = Heap::new(16);
        let kept = heap.alloc_pair(Value::Number(1.0), Value::Nil).unwrap();
        heap.alloc_pair(Value::Number(2.0), Value::Nil).unwrap();
        heap.alloc_pair(Value::Number(3.0), Value::Nil).unwrap();
        let freed = collect(&mut heap, &[Value::Pair(kept)]);
        assert_eq!(freed, 2);
        assert_eq!(heap.occupied_count(), 1);
        // Freed slots come back from the free list.
        heap.alloc_pair(Value::Nil, Value::Nil).unwrap();
        assert_eq!(heap.occupied_count(), 2);
    }

    #[test]
    fn cyclic_structure_is_collected() {
        let mut heap = Heap::new(16);
        let cell = heap.alloc_pair(Value::Number(1.0), Value::Nil).unwrap();
        heap.set_cdr(cell, Value::Pair(cell));
        let freed = collect(&mut heap, &[]);
        assert_eq!(freed, 1);
        assert_eq!(heap.occupied_count(), 0);
    }

    #[test]
    fn marking_terminates_on_cycles() {
        let mut heap = Heap::new(16);
        let a = heap.alloc_pair(Value::Nil, Value::Nil).unwrap();
        let b = heap.alloc_pair(Value::Pair(a), Value::Pair(a)).unwrap();
        heap.set_cdr(a, Value::Pair(b));
        let freed = collect(&mut heap, &[Value::Pair(a)]);
        assert_eq!(freed, 0);
        assert_eq!(heap.occupied_count(), 2);
    }

    #[test]
    fn frames_keep_their_bindings_alive() {
        let mut heap = Heap::new(16);
        let frame = heap.alloc_frame(None).unwrap();
        let pair = heap.alloc_pair(Value::Number(7.0), Value::Nil).unwrap();
        heap.frame_mut(frame)
            .bindings
            .push((crate::value::SymbolId(0), Value::Pair(pair)));

        heap.clear_marks();
        let mut worklist = Vec::new();
        heap.mark_frame(frame, &mut worklist);
        heap.process_worklist(&mut worklist);
        let freed = heap.sweep();

        assert_eq!(freed, 0);
        assert_eq!(heap.car(pair), Value::Number(7.0));
    }

    #[test]
    fn list_round_trips_through_vec() {
        let mut heap = Heap::new(16);
        let values = [Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)];
        let list = heap.list(&values).unwrap();
        assert!(heap.is_proper_list(list));
        assert_eq!(heap.list_to_vec(list).unwrap(), values.to_vec());
    }
}
